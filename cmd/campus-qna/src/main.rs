//! # campus-qna
//!
//! Assembles the adapters around the action façade and serves the HTTP API.

mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use api_adapters::metrics::Metrics;
use api_adapters::{router, AppState};
use auth_adapters::{HmacCodeHasher, JwtSessionProvider};
use configs::{ModerationPolicyKind, Settings};
use domains::ports::SystemClock;
use services::media::MediaSweeper;
use services::{
    ActionFacade, FacadePorts, FixedThreshold, ModerationPolicy, RateLimitTable, TrustWeighted,
};
use storage_adapters::{LocalMediaStorage, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    logging::init(&settings.logging);

    // 1. Storage
    let store = Arc::new(
        PgStore::connect(
            settings.database.url.expose_secret(),
            settings.database.max_connections,
        )
        .await
        .context("failed to connect to postgres")?,
    );
    store.migrate().await.context("failed to run migrations")?;
    let media = Arc::new(LocalMediaStorage::new(settings.media.root.clone()));

    // 2. Auth
    let hasher = Arc::new(
        HmacCodeHasher::new(&settings.recovery.pepper).context("invalid recovery pepper")?,
    );
    let sessions = Arc::new(JwtSessionProvider::new(
        &settings.auth.jwt_secret,
        chrono::Duration::days(settings.auth.session_ttl_days),
    ));

    // 3. Policy
    let threshold = settings.moderation.threshold;
    let policy: Arc<dyn ModerationPolicy> = match settings.moderation.policy {
        ModerationPolicyKind::Fixed => Arc::new(FixedThreshold { threshold }),
        ModerationPolicyKind::TrustWeighted => Arc::new(TrustWeighted { threshold }),
    };
    info!(policy = ?settings.moderation.policy, threshold, "moderation policy selected");

    let facade = Arc::new(ActionFacade::new(FacadePorts {
        identities: store.clone(),
        events: store.clone(),
        content: store,
        media,
        hasher,
        policy,
        clock: Arc::new(SystemClock),
        rate_limits: RateLimitTable::standard(),
        sweep_batch: settings.media.sweep_batch,
    }));

    spawn_media_sweep(
        facade.media_sweeper(),
        Duration::from_secs(settings.media.sweep_interval_secs.max(1)),
    );

    let app = router(AppState {
        facade,
        sessions,
        metrics: Arc::new(Metrics::new()),
    });

    let addr = settings.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "campus-qna listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("campus-qna stopped");
    Ok(())
}

/// Drains the media deletion queue on a fixed interval.
fn spawn_media_sweep(sweeper: Arc<MediaSweeper>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweeper.sweep().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "periodic media sweep"),
                Err(err) => warn!(error = %err, "periodic media sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
