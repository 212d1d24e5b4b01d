//! Deferred removal of image objects whose owning content was deleted.
//!
//! Best-effort and safe to repeat: rows are only marked processed after the
//! storage call succeeds, so a failed batch is picked up by the next sweep.

use std::sync::Arc;

use tracing::{debug, warn};

use domains::errors::{DomainError, Result};
use domains::ports::{Clock, ContentStore, MediaStorage};

pub const DEFAULT_SWEEP_BATCH: u32 = 200;

pub struct MediaSweeper {
    content: Arc<dyn ContentStore>,
    storage: Arc<dyn MediaStorage>,
    clock: Arc<dyn Clock>,
    batch: u32,
}

impl MediaSweeper {
    pub fn new(
        content: Arc<dyn ContentStore>,
        storage: Arc<dyn MediaStorage>,
        clock: Arc<dyn Clock>,
        batch: u32,
    ) -> Self {
        Self {
            content,
            storage,
            clock,
            batch: batch.max(1),
        }
    }

    /// Drains one batch. Returns how many queue rows were processed.
    pub async fn sweep(&self) -> Result<usize> {
        let pending = self
            .content
            .pending_media_deletions(self.batch)
            .await
            .map_err(DomainError::store("media queue read"))?;
        if pending.is_empty() {
            return Ok(0);
        }

        let (ids, paths): (Vec<i64>, Vec<String>) =
            pending.into_iter().map(|item| (item.id, item.path)).unzip();
        let count = ids.len();

        self.storage
            .remove(paths)
            .await
            .map_err(DomainError::store("media object removal"))?;
        self.content
            .mark_media_deletions_processed(ids, self.clock.now())
            .await
            .map_err(DomainError::store("media queue update"))?;

        debug!(count, "media deletion batch processed");
        Ok(count)
    }

    /// Sweeps once and logs instead of failing. Used after user actions.
    pub async fn sweep_best_effort(&self) {
        if let Err(err) = self.sweep().await {
            warn!(error = %err, "media deletion sweep failed; will retry");
        }
    }
}
