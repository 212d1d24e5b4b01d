//! # Postgres store
//!
//! Maps the relational schema in `migrations/` onto the storage ports.
//! Uniqueness and the recovery check-and-set are enforced by the database,
//! never by read-then-write in Rust.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use domains::errors::{StoreError, StoreResult};
use domains::models::{
    AnswerRecord, ContentStatus, MediaDeletion, NewAnswer, NewQuestion, NewReply, NewReport,
    NewUser, NewVote, QuestionRecord, RateLimitedAction, RecoveryConsume, TargetType, User, UserId,
    VOTE_VALUE,
};
use domains::ports::{ContentStore, EventStore, IdentityStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Translates driver errors into the storage taxonomy.
///
/// Foreign keys onto `users` mean the identity row is not visible yet.
/// Foreign keys onto content mean the parent does not exist.
fn map_db(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let constraint = db_err.constraint().unwrap_or_default().to_string();
        if db_err.is_unique_violation() {
            return StoreError::Duplicate(constraint);
        }
        if db_err.is_foreign_key_violation() {
            return match constraint.as_str() {
                "answers_question_id_fkey" => StoreError::NotFound("question".into()),
                "answer_replies_answer_id_fkey" => StoreError::NotFound("answer".into()),
                _ => StoreError::ForeignKeyNotReady(constraint),
            };
        }
    }
    StoreError::Backend(err.to_string())
}

const CLAIMANT_ACTIVITY: &str = "SELECT \
       EXISTS (SELECT 1 FROM questions WHERE author_id = $1) \
    OR EXISTS (SELECT 1 FROM answers WHERE author_id = $1) \
    OR EXISTS (SELECT 1 FROM answer_replies WHERE author_id = $1) \
    OR EXISTS (SELECT 1 FROM votes WHERE user_id = $1) \
    OR EXISTS (SELECT 1 FROM reports WHERE reporter_id = $1)";

fn table_for(target: TargetType) -> &'static str {
    match target {
        TargetType::Question => "questions",
        TargetType::Answer => "answers",
    }
}

fn parse_status(raw: &str) -> StoreResult<ContentStatus> {
    raw.parse()
        .map_err(|_| StoreError::Backend(format!("unknown content status {raw:?}")))
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        anon_handle: row.get("anon_handle"),
        color_seed: row.get("color_seed"),
        trust_score: row.get("trust_score"),
        recovery_code_hash: row.get("recovery_code_hash"),
        recovery_code_created_at: row.get("recovery_code_created_at"),
        recovery_code_used_at: row.get("recovery_code_used_at"),
        created_at: row.get("created_at"),
    }
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_db)?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, anon_handle, color_seed, trust_score, recovery_code_hash, \
             recovery_code_created_at, recovery_code_used_at, created_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, anon_handle, color_seed, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.id)
        .bind(user.anon_handle)
        .bind(user.color_seed)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn update_recovery_hash(
        &self,
        id: UserId,
        hash: String,
        issued_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET recovery_code_hash = $2, recovery_code_created_at = $3, \
             recovery_code_used_at = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .bind(issued_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user".into()));
        }
        Ok(())
    }

    async fn find_user_by_recovery_hash(&self, hash: &str) -> StoreResult<Option<UserId>> {
        let row = sqlx::query(
            "SELECT id FROM users WHERE recovery_code_hash = $1 AND recovery_code_used_at IS NULL",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn consume_recovery_code(
        &self,
        owner: UserId,
        hash: &str,
        claimant: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<RecoveryConsume> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;

        // 1. Lock both identity rows in id order. Content inserts take a key
        //    share lock on their author row, so the claimant cannot gain
        //    activity until this transaction ends.
        let locked: Vec<UserId> = sqlx::query_scalar(
            "SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(vec![owner, claimant])
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db)?;
        if !locked.contains(&claimant) {
            return Err(StoreError::NotFound("claimant user".into()));
        }

        // 2. Claimant must hold nothing
        let active: bool = sqlx::query_scalar(CLAIMANT_ACTIVITY)
            .bind(claimant)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db)?;
        if active {
            return Ok(RecoveryConsume::ClaimantNotEmpty);
        }

        // 3. Conditional consume; zero rows means another claim won
        let consumed = sqlx::query(
            "UPDATE users SET recovery_code_used_at = $3 \
             WHERE id = $1 AND recovery_code_hash = $2 AND recovery_code_used_at IS NULL \
             RETURNING trust_score, anon_handle, color_seed",
        )
        .bind(owner)
        .bind(hash)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db)?;

        let Some(row) = consumed else {
            return Ok(RecoveryConsume::AlreadyConsumed);
        };
        let trust_score: i32 = row.get("trust_score");
        let anon_handle: String = row.get("anon_handle");
        let color_seed: i32 = row.get("color_seed");

        // 4. Re-parent authored content
        for table in ["questions", "answers", "answer_replies"] {
            sqlx::query(&format!(
                "UPDATE {table} SET author_id = $2 WHERE author_id = $1"
            ))
            .bind(owner)
            .bind(claimant)
            .execute(&mut *tx)
            .await
            .map_err(map_db)?;
        }

        // 5. Ledgers, skipping rows the claimant already holds
        sqlx::query(
            "UPDATE votes v SET user_id = $2 WHERE v.user_id = $1 AND NOT EXISTS ( \
             SELECT 1 FROM votes c WHERE c.user_id = $2 \
             AND c.target_type = v.target_type AND c.target_id = v.target_id)",
        )
        .bind(owner)
        .bind(claimant)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;
        sqlx::query(
            "UPDATE reports r SET reporter_id = $2 WHERE r.reporter_id = $1 AND NOT EXISTS ( \
             SELECT 1 FROM reports c WHERE c.reporter_id = $2 \
             AND c.target_type = r.target_type AND c.target_id = r.target_id)",
        )
        .bind(owner)
        .bind(claimant)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;

        // 6. Identity attributes
        let updated = sqlx::query(
            "UPDATE users SET trust_score = $2, anon_handle = $3, color_seed = $4 WHERE id = $1",
        )
        .bind(claimant)
        .bind(trust_score)
        .bind(anon_handle)
        .bind(color_seed)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound("claimant user".into()));
        }

        tx.commit().await.map_err(map_db)?;
        debug!(%owner, %claimant, "identity moved to claimant");
        Ok(RecoveryConsume::Consumed)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn count_events(
        &self,
        action: RateLimitedAction,
        user: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let sql = match action {
            RateLimitedAction::CreateQuestion => {
                "SELECT COUNT(*) FROM questions WHERE author_id = $1 AND created_at >= $2"
            }
            RateLimitedAction::CreateAnswer => {
                "SELECT COUNT(*) FROM answers WHERE author_id = $1 AND created_at >= $2"
            }
            RateLimitedAction::Vote => {
                "SELECT COUNT(*) FROM votes WHERE user_id = $1 AND created_at >= $2"
            }
            RateLimitedAction::Report => {
                "SELECT COUNT(*) FROM reports WHERE reporter_id = $1 AND created_at >= $2"
            }
        };
        let count: i64 = sqlx::query_scalar(sql)
            .bind(user)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn insert_question(&self, question: NewQuestion) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO questions (id, author_id, title, body, category, tags, image_paths, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(question.id)
        .bind(question.author_id)
        .bind(question.title)
        .bind(question.body)
        .bind(question.category.as_str())
        .bind(question.tags)
        .bind(question.image_paths)
        .bind(question.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn get_question(&self, id: Uuid) -> StoreResult<Option<QuestionRecord>> {
        let row = sqlx::query(
            "SELECT id, author_id, status, score, created_at FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;

        row.map(|row| {
            Ok(QuestionRecord {
                id: row.get("id"),
                author_id: row.get("author_id"),
                status: parse_status(row.get("status"))?,
                score: row.get("score"),
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }

    async fn update_question(
        &self,
        id: Uuid,
        title: String,
        body: String,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE questions SET title = $2, body = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(title)
        .bind(body)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("question".into()));
        }
        Ok(())
    }

    async fn delete_question(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;

        sqlx::query(
            "INSERT INTO media_deletion_queue (path) \
             SELECT unnest(image_paths) FROM questions WHERE id = $1 \
             UNION ALL \
             SELECT unnest(image_paths) FROM answers WHERE question_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;

        // Answers and replies go with the cascade
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("question".into()));
        }

        tx.commit().await.map_err(map_db)?;
        Ok(())
    }

    async fn insert_answer(&self, answer: NewAnswer) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO answers (id, question_id, author_id, body, image_paths, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(answer.id)
        .bind(answer.question_id)
        .bind(answer.author_id)
        .bind(answer.body)
        .bind(answer.image_paths)
        .bind(answer.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn get_answer(&self, id: Uuid) -> StoreResult<Option<AnswerRecord>> {
        let row = sqlx::query(
            "SELECT id, question_id, author_id, status, is_verified, score, created_at \
             FROM answers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?;

        row.map(|row| {
            Ok(AnswerRecord {
                id: row.get("id"),
                question_id: row.get("question_id"),
                author_id: row.get("author_id"),
                status: parse_status(row.get("status"))?,
                is_verified: row.get("is_verified"),
                score: row.get("score"),
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }

    async fn update_answer(&self, id: Uuid, body: String, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE answers SET body = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(body)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("answer".into()));
        }
        Ok(())
    }

    async fn delete_answer(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;

        sqlx::query(
            "INSERT INTO media_deletion_queue (path) \
             SELECT unnest(image_paths) FROM answers WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;

        let result = sqlx::query("DELETE FROM answers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("answer".into()));
        }

        tx.commit().await.map_err(map_db)?;
        Ok(())
    }

    async fn set_answer_verified(&self, id: Uuid, verified: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE answers SET is_verified = $2 WHERE id = $1")
            .bind(id)
            .bind(verified)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("answer".into()));
        }
        Ok(())
    }

    async fn insert_reply(&self, reply: NewReply) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO answer_replies (id, answer_id, author_id, body, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(reply.id)
        .bind(reply.answer_id)
        .bind(reply.author_id)
        .bind(reply.body)
        .bind(reply.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    /// Vote row and score bump share one transaction.
    async fn insert_vote(&self, vote: NewVote) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;

        sqlx::query(
            "INSERT INTO votes (user_id, target_type, target_id, value, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(vote.user_id)
        .bind(vote.target_type.as_str())
        .bind(vote.target_id)
        .bind(VOTE_VALUE)
        .bind(vote.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;

        let table = table_for(vote.target_type);
        let bumped = sqlx::query(&format!(
            "UPDATE {table} SET score = score + $2 WHERE id = $1"
        ))
        .bind(vote.target_id)
        .bind(i64::from(VOTE_VALUE))
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;
        if bumped.rows_affected() == 0 {
            return Err(StoreError::NotFound(vote.target_type.as_str().into()));
        }

        tx.commit().await.map_err(map_db)?;
        Ok(())
    }

    async fn read_target_score(&self, target: TargetType, id: Uuid) -> StoreResult<Option<i64>> {
        let table = table_for(target);
        sqlx::query_scalar(&format!("SELECT score FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)
    }

    async fn insert_report(&self, report: NewReport) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;

        let table = table_for(report.target_type);
        let exists: bool =
            sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"))
                .bind(report.target_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db)?;
        if !exists {
            return Err(StoreError::NotFound(report.target_type.as_str().into()));
        }

        sqlx::query(
            "INSERT INTO reports (reporter_id, target_type, target_id, reason, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(report.reporter_id)
        .bind(report.target_type.as_str())
        .bind(report.target_id)
        .bind(report.reason)
        .bind(report.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db)?;

        tx.commit().await.map_err(map_db)?;
        Ok(())
    }

    async fn count_reports(&self, target: TargetType, id: Uuid) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports WHERE target_type = $1 AND target_id = $2",
        )
        .bind(target.as_str())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(count.max(0) as u64)
    }

    async fn reporter_trust_scores(&self, target: TargetType, id: Uuid) -> StoreResult<Vec<i32>> {
        sqlx::query_scalar(
            "SELECT COALESCE(u.trust_score, 0) FROM reports r \
             LEFT JOIN users u ON u.id = r.reporter_id \
             WHERE r.target_type = $1 AND r.target_id = $2",
        )
        .bind(target.as_str())
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)
    }

    async fn target_status(
        &self,
        target: TargetType,
        id: Uuid,
    ) -> StoreResult<Option<ContentStatus>> {
        let table = table_for(target);
        let status: Option<String> =
            sqlx::query_scalar(&format!("SELECT status FROM {table} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db)?;
        status.as_deref().map(parse_status).transpose()
    }

    async fn set_target_hidden(&self, target: TargetType, id: Uuid) -> StoreResult<bool> {
        let table = table_for(target);
        let flipped = sqlx::query(&format!(
            "UPDATE {table} SET status = 'hidden' WHERE id = $1 AND status <> 'hidden'"
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        if flipped.rows_affected() > 0 {
            return Ok(true);
        }

        match self.target_status(target, id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(target.as_str().into())),
        }
    }

    async fn pending_media_deletions(&self, limit: u32) -> StoreResult<Vec<MediaDeletion>> {
        let rows = sqlx::query(
            "SELECT id, path FROM media_deletion_queue WHERE processed_at IS NULL \
             ORDER BY id LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;

        Ok(rows
            .into_iter()
            .map(|row| MediaDeletion {
                id: row.get("id"),
                path: row.get("path"),
            })
            .collect())
    }

    async fn mark_media_deletions_processed(
        &self,
        ids: Vec<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE media_deletion_queue SET processed_at = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_and_report_tables_match_target_types() {
        assert_eq!(table_for(TargetType::Question), "questions");
        assert_eq!(table_for(TargetType::Answer), "answers");
    }

    #[test]
    fn unknown_status_is_a_backend_error() {
        assert_eq!(parse_status("hidden").unwrap(), ContentStatus::Hidden);
        assert!(matches!(parse_status("deleted"), Err(StoreError::Backend(_))));
    }

    #[test]
    fn non_database_errors_are_backend_errors() {
        assert!(matches!(map_db(sqlx::Error::RowNotFound), StoreError::Backend(_)));
    }
}
