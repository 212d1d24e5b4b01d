//! # In-memory store
//!
//! Implements every storage port over `DashMap`s. It honours the same
//! invariants as the Postgres adapter: unique votes and reports, conditional
//! consume of recovery codes, lazy identity rows that must exist before
//! content referencing them. Used by tests and single-process demos.
//!
//! Shard guards are never held while touching the same map again. Writes
//! made on behalf of an author hold `identity_gate` shared; a recovery
//! consume holds it exclusively, so the claimant cannot gain activity
//! between the emptiness check and the swap.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use domains::errors::{StoreError, StoreResult};
use domains::models::{
    AnswerRecord, ContentStatus, MediaDeletion, NewAnswer, NewQuestion, NewReply, NewReport,
    NewUser, NewVote, QuestionCategory, QuestionRecord, RateLimitedAction, RecoveryConsume,
    TargetType, User, UserId,
};
use domains::ports::{ContentStore, EventStore, IdentityStore, MediaStorage};

#[derive(Debug, Clone)]
struct QuestionRow {
    author_id: UserId,
    #[allow(dead_code)]
    title: String,
    #[allow(dead_code)]
    body: String,
    #[allow(dead_code)]
    category: QuestionCategory,
    #[allow(dead_code)]
    tags: Vec<String>,
    image_paths: Vec<String>,
    score: i64,
    status: ContentStatus,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct AnswerRow {
    question_id: Uuid,
    author_id: UserId,
    #[allow(dead_code)]
    body: String,
    image_paths: Vec<String>,
    score: i64,
    status: ContentStatus,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct ReplyRow {
    answer_id: Uuid,
    author_id: UserId,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ReportRow {
    #[allow(dead_code)]
    reason: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct QueuedMedia {
    path: String,
    processed_at: Option<DateTime<Utc>>,
}

type TargetKey = (UserId, TargetType, Uuid);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: DashMap<UserId, User>,
    questions: DashMap<Uuid, QuestionRow>,
    answers: DashMap<Uuid, AnswerRow>,
    replies: DashMap<Uuid, ReplyRow>,
    votes: DashMap<TargetKey, DateTime<Utc>>,
    reports: DashMap<TargetKey, ReportRow>,
    media_queue: DashMap<i64, QueuedMedia>,
    next_media_id: AtomicI64,
    identity_gate: RwLock<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stands in for external moderation adjusting a user's trust.
    pub fn set_trust_score(&self, id: UserId, score: i32) -> StoreResult<()> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        user.trust_score = score;
        Ok(())
    }

    /// Number of stored votes on a target.
    pub fn vote_count(&self, target: TargetType, id: Uuid) -> usize {
        self.votes
            .iter()
            .filter(|entry| entry.key().1 == target && entry.key().2 == id)
            .count()
    }

    pub fn question_author(&self, id: Uuid) -> Option<UserId> {
        self.questions.get(&id).map(|q| q.author_id)
    }

    pub fn question_updated_at(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.questions.get(&id).and_then(|q| q.updated_at)
    }

    fn target_exists(&self, target: TargetType, id: Uuid) -> bool {
        match target {
            TargetType::Question => self.questions.contains_key(&id),
            TargetType::Answer => self.answers.contains_key(&id),
        }
    }

    fn authoring(&self) -> StoreResult<RwLockReadGuard<'_, ()>> {
        self.identity_gate
            .read()
            .map_err(|_| StoreError::Backend("identity gate poisoned".into()))
    }

    fn exclusive(&self) -> StoreResult<RwLockWriteGuard<'_, ()>> {
        self.identity_gate
            .write()
            .map_err(|_| StoreError::Backend("identity gate poisoned".into()))
    }

    /// Questions, answers, replies, votes and reports held by `id`.
    fn activity_of(&self, id: UserId) -> usize {
        self.questions.iter().filter(|q| q.author_id == id).count()
            + self.answers.iter().filter(|a| a.author_id == id).count()
            + self.replies.iter().filter(|r| r.author_id == id).count()
            + self.votes.iter().filter(|v| v.key().0 == id).count()
            + self.reports.iter().filter(|r| r.key().0 == id).count()
    }

    fn require_user(&self, id: UserId) -> StoreResult<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyNotReady(format!("user {id}")))
        }
    }

    fn enqueue_media(&self, paths: Vec<String>) {
        for path in paths {
            let id = self.next_media_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.media_queue.insert(
                id,
                QueuedMedia {
                    path,
                    processed_at: None,
                },
            );
        }
    }

    fn remove_answer_cascade(&self, answer_id: Uuid) -> Option<AnswerRow> {
        let (_, answer) = self.answers.remove(&answer_id)?;
        self.replies.retain(|_, reply| reply.answer_id != answer_id);
        Some(answer)
    }

    /// Moves every key owned by `from` onto `to`. A key `to` already holds
    /// stays with `from`.
    fn reparent_keys<V>(map: &DashMap<TargetKey, V>, from: UserId, to: UserId) {
        let owned: Vec<TargetKey> = map
            .iter()
            .filter(|entry| entry.key().0 == from)
            .map(|entry| *entry.key())
            .collect();
        for key in owned {
            let moved = (to, key.1, key.2);
            if map.contains_key(&moved) {
                continue;
            }
            if let Some((_, value)) = map.remove(&key) {
                map.insert(moved, value);
            }
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<()> {
        match self.users.entry(user.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("users_pkey".into())),
            Entry::Vacant(slot) => {
                slot.insert(User {
                    id: user.id,
                    anon_handle: user.anon_handle,
                    color_seed: user.color_seed,
                    trust_score: 0,
                    recovery_code_hash: None,
                    recovery_code_created_at: None,
                    recovery_code_used_at: None,
                    created_at: user.created_at,
                });
                Ok(())
            }
        }
    }

    async fn update_recovery_hash(
        &self,
        id: UserId,
        hash: String,
        issued_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        user.recovery_code_hash = Some(hash);
        user.recovery_code_created_at = Some(issued_at);
        user.recovery_code_used_at = None;
        Ok(())
    }

    async fn find_user_by_recovery_hash(&self, hash: &str) -> StoreResult<Option<UserId>> {
        Ok(self
            .users
            .iter()
            .find(|user| {
                user.recovery_code_used_at.is_none()
                    && user.recovery_code_hash.as_deref() == Some(hash)
            })
            .map(|user| user.id))
    }

    async fn consume_recovery_code(
        &self,
        owner: UserId,
        hash: &str,
        claimant: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<RecoveryConsume> {
        let _exclusive = self.exclusive()?;
        if !self.users.contains_key(&claimant) {
            return Err(StoreError::NotFound("claimant user".into()));
        }

        // Check-and-set under the owner's shard lock.
        let (trust_score, anon_handle, color_seed) = {
            let Some(mut row) = self.users.get_mut(&owner) else {
                return Ok(RecoveryConsume::AlreadyConsumed);
            };
            if row.recovery_code_used_at.is_some() || row.recovery_code_hash.as_deref() != Some(hash) {
                return Ok(RecoveryConsume::AlreadyConsumed);
            }
            if self.activity_of(claimant) > 0 {
                return Ok(RecoveryConsume::ClaimantNotEmpty);
            }
            row.recovery_code_used_at = Some(at);
            (row.trust_score, row.anon_handle.clone(), row.color_seed)
        };

        for mut question in self.questions.iter_mut() {
            if question.author_id == owner {
                question.author_id = claimant;
            }
        }
        for mut answer in self.answers.iter_mut() {
            if answer.author_id == owner {
                answer.author_id = claimant;
            }
        }
        for mut reply in self.replies.iter_mut() {
            if reply.author_id == owner {
                reply.author_id = claimant;
            }
        }
        Self::reparent_keys(&self.votes, owner, claimant);
        Self::reparent_keys(&self.reports, owner, claimant);

        if let Some(mut row) = self.users.get_mut(&claimant) {
            row.trust_score = trust_score;
            row.anon_handle = anon_handle;
            row.color_seed = color_seed;
        }

        debug!(%owner, %claimant, "identity moved to claimant");
        Ok(RecoveryConsume::Consumed)
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn count_events(
        &self,
        action: RateLimitedAction,
        user: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let count = match action {
            RateLimitedAction::CreateQuestion => self
                .questions
                .iter()
                .filter(|q| q.author_id == user && q.created_at >= since)
                .count(),
            RateLimitedAction::CreateAnswer => self
                .answers
                .iter()
                .filter(|a| a.author_id == user && a.created_at >= since)
                .count(),
            RateLimitedAction::Vote => self
                .votes
                .iter()
                .filter(|v| v.key().0 == user && *v.value() >= since)
                .count(),
            RateLimitedAction::Report => self
                .reports
                .iter()
                .filter(|r| r.key().0 == user && r.value().created_at >= since)
                .count(),
        };
        Ok(count as u64)
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn insert_question(&self, question: NewQuestion) -> StoreResult<()> {
        let _authoring = self.authoring()?;
        self.require_user(question.author_id)?;
        match self.questions.entry(question.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("questions_pkey".into())),
            Entry::Vacant(slot) => {
                slot.insert(QuestionRow {
                    author_id: question.author_id,
                    title: question.title,
                    body: question.body,
                    category: question.category,
                    tags: question.tags,
                    image_paths: question.image_paths,
                    score: 0,
                    status: ContentStatus::Active,
                    created_at: question.created_at,
                    updated_at: None,
                });
                Ok(())
            }
        }
    }

    async fn get_question(&self, id: Uuid) -> StoreResult<Option<QuestionRecord>> {
        Ok(self.questions.get(&id).map(|q| QuestionRecord {
            id,
            author_id: q.author_id,
            status: q.status,
            score: q.score,
            created_at: q.created_at,
        }))
    }

    async fn update_question(
        &self,
        id: Uuid,
        title: String,
        body: String,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut question = self
            .questions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("question".into()))?;
        question.title = title;
        question.body = body;
        question.updated_at = Some(at);
        Ok(())
    }

    async fn delete_question(&self, id: Uuid) -> StoreResult<()> {
        let (_, question) = self
            .questions
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound("question".into()))?;
        let mut paths = question.image_paths;

        let answer_ids: Vec<Uuid> = self
            .answers
            .iter()
            .filter(|a| a.question_id == id)
            .map(|a| *a.key())
            .collect();
        for answer_id in answer_ids {
            if let Some(answer) = self.remove_answer_cascade(answer_id) {
                paths.extend(answer.image_paths);
            }
        }

        self.enqueue_media(paths);
        Ok(())
    }

    async fn insert_answer(&self, answer: NewAnswer) -> StoreResult<()> {
        let _authoring = self.authoring()?;
        if !self.questions.contains_key(&answer.question_id) {
            return Err(StoreError::NotFound("question".into()));
        }
        self.require_user(answer.author_id)?;
        match self.answers.entry(answer.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("answers_pkey".into())),
            Entry::Vacant(slot) => {
                slot.insert(AnswerRow {
                    question_id: answer.question_id,
                    author_id: answer.author_id,
                    body: answer.body,
                    image_paths: answer.image_paths,
                    score: 0,
                    status: ContentStatus::Active,
                    is_verified: false,
                    created_at: answer.created_at,
                    updated_at: None,
                });
                Ok(())
            }
        }
    }

    async fn get_answer(&self, id: Uuid) -> StoreResult<Option<AnswerRecord>> {
        Ok(self.answers.get(&id).map(|a| AnswerRecord {
            id,
            question_id: a.question_id,
            author_id: a.author_id,
            status: a.status,
            is_verified: a.is_verified,
            score: a.score,
            created_at: a.created_at,
        }))
    }

    async fn update_answer(&self, id: Uuid, body: String, at: DateTime<Utc>) -> StoreResult<()> {
        let mut answer = self
            .answers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("answer".into()))?;
        answer.body = body;
        answer.updated_at = Some(at);
        Ok(())
    }

    async fn delete_answer(&self, id: Uuid) -> StoreResult<()> {
        let answer = self
            .remove_answer_cascade(id)
            .ok_or_else(|| StoreError::NotFound("answer".into()))?;
        self.enqueue_media(answer.image_paths);
        Ok(())
    }

    async fn set_answer_verified(&self, id: Uuid, verified: bool) -> StoreResult<()> {
        let mut answer = self
            .answers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("answer".into()))?;
        answer.is_verified = verified;
        Ok(())
    }

    async fn insert_reply(&self, reply: NewReply) -> StoreResult<()> {
        let _authoring = self.authoring()?;
        if !self.answers.contains_key(&reply.answer_id) {
            return Err(StoreError::NotFound("answer".into()));
        }
        self.require_user(reply.author_id)?;
        match self.replies.entry(reply.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("answer_replies_pkey".into())),
            Entry::Vacant(slot) => {
                slot.insert(ReplyRow {
                    answer_id: reply.answer_id,
                    author_id: reply.author_id,
                    created_at: reply.created_at,
                });
                Ok(())
            }
        }
    }

    async fn insert_vote(&self, vote: NewVote) -> StoreResult<()> {
        let _authoring = self.authoring()?;
        if !self.target_exists(vote.target_type, vote.target_id) {
            return Err(StoreError::NotFound(vote.target_type.as_str().into()));
        }
        match self
            .votes
            .entry((vote.user_id, vote.target_type, vote.target_id))
        {
            Entry::Occupied(_) => return Err(StoreError::Duplicate("votes_pkey".into())),
            Entry::Vacant(slot) => {
                slot.insert(vote.created_at);
            }
        }

        let bumped = match vote.target_type {
            TargetType::Question => self
                .questions
                .get_mut(&vote.target_id)
                .map(|mut q| q.score += 1),
            TargetType::Answer => self
                .answers
                .get_mut(&vote.target_id)
                .map(|mut a| a.score += 1),
        };
        if bumped.is_none() {
            // Target deleted between the existence check and the bump.
            self.votes
                .remove(&(vote.user_id, vote.target_type, vote.target_id));
            return Err(StoreError::NotFound(vote.target_type.as_str().into()));
        }
        Ok(())
    }

    async fn read_target_score(&self, target: TargetType, id: Uuid) -> StoreResult<Option<i64>> {
        Ok(match target {
            TargetType::Question => self.questions.get(&id).map(|q| q.score),
            TargetType::Answer => self.answers.get(&id).map(|a| a.score),
        })
    }

    async fn insert_report(&self, report: NewReport) -> StoreResult<()> {
        let _authoring = self.authoring()?;
        if !self.target_exists(report.target_type, report.target_id) {
            return Err(StoreError::NotFound(report.target_type.as_str().into()));
        }
        match self
            .reports
            .entry((report.reporter_id, report.target_type, report.target_id))
        {
            Entry::Occupied(_) => Err(StoreError::Duplicate("reports_reporter_target_key".into())),
            Entry::Vacant(slot) => {
                slot.insert(ReportRow {
                    reason: report.reason,
                    created_at: report.created_at,
                });
                Ok(())
            }
        }
    }

    async fn count_reports(&self, target: TargetType, id: Uuid) -> StoreResult<u64> {
        Ok(self
            .reports
            .iter()
            .filter(|r| r.key().1 == target && r.key().2 == id)
            .count() as u64)
    }

    async fn reporter_trust_scores(&self, target: TargetType, id: Uuid) -> StoreResult<Vec<i32>> {
        let reporters: Vec<UserId> = self
            .reports
            .iter()
            .filter(|r| r.key().1 == target && r.key().2 == id)
            .map(|r| r.key().0)
            .collect();
        Ok(reporters
            .into_iter()
            .map(|reporter| self.users.get(&reporter).map_or(0, |u| u.trust_score))
            .collect())
    }

    async fn target_status(
        &self,
        target: TargetType,
        id: Uuid,
    ) -> StoreResult<Option<ContentStatus>> {
        Ok(match target {
            TargetType::Question => self.questions.get(&id).map(|q| q.status),
            TargetType::Answer => self.answers.get(&id).map(|a| a.status),
        })
    }

    async fn set_target_hidden(&self, target: TargetType, id: Uuid) -> StoreResult<bool> {
        let flip = |status: &mut ContentStatus| {
            let changed = *status != ContentStatus::Hidden;
            *status = ContentStatus::Hidden;
            changed
        };
        let changed = match target {
            TargetType::Question => self.questions.get_mut(&id).map(|mut q| flip(&mut q.status)),
            TargetType::Answer => self.answers.get_mut(&id).map(|mut a| flip(&mut a.status)),
        };
        changed.ok_or_else(|| StoreError::NotFound(target.as_str().into()))
    }

    async fn pending_media_deletions(&self, limit: u32) -> StoreResult<Vec<MediaDeletion>> {
        let mut pending: Vec<MediaDeletion> = self
            .media_queue
            .iter()
            .filter(|item| item.processed_at.is_none())
            .map(|item| MediaDeletion {
                id: *item.key(),
                path: item.path.clone(),
            })
            .collect();
        pending.sort_by_key(|item| item.id);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_media_deletions_processed(
        &self,
        ids: Vec<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        for id in ids {
            if let Some(mut item) = self.media_queue.get_mut(&id) {
                item.processed_at = Some(at);
            }
        }
        Ok(())
    }
}

/// Records removals instead of touching a real bucket.
#[derive(Debug, Default)]
pub struct InMemoryMediaStorage {
    removed: Mutex<Vec<String>>,
}

impl InMemoryMediaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed
            .lock()
            .map(|removed| removed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaStorage for InMemoryMediaStorage {
    async fn remove(&self, paths: Vec<String>) -> StoreResult<()> {
        let mut removed = self
            .removed
            .lock()
            .map_err(|_| StoreError::Backend("media log poisoned".into()))?;
        removed.extend(paths);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_000)
    }

    async fn store_with_user() -> (InMemoryStore, UserId) {
        let store = InMemoryStore::new();
        let id = UserId::new_v4();
        store
            .insert_user(NewUser {
                id,
                anon_handle: "anon_a".into(),
                color_seed: 10,
                created_at: now(),
            })
            .await
            .unwrap();
        (store, id)
    }

    fn question(author: UserId, paths: &[&str]) -> NewQuestion {
        NewQuestion {
            id: Uuid::new_v4(),
            author_id: author,
            title: "Where is room B12?".into(),
            body: "Lost on the first day.".into(),
            category: QuestionCategory::Facilities,
            tags: vec![],
            image_paths: paths.iter().map(|p| p.to_string()).collect(),
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn duplicate_user_insert_is_reported() {
        let (store, id) = store_with_user().await;
        let err = store
            .insert_user(NewUser {
                id,
                anon_handle: "anon_b".into(),
                color_seed: 1,
                created_at: now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn content_requires_identity_row() {
        let store = InMemoryStore::new();
        let err = store
            .insert_question(question(UserId::new_v4(), &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyNotReady(_)));
    }

    #[tokio::test]
    async fn vote_bumps_score_once() {
        let (store, user) = store_with_user().await;
        let q = question(user, &[]);
        let qid = q.id;
        store.insert_question(q).await.unwrap();

        let vote = NewVote {
            user_id: user,
            target_type: TargetType::Question,
            target_id: qid,
            created_at: now(),
        };
        store.insert_vote(vote.clone()).await.unwrap();
        assert!(matches!(store.insert_vote(vote).await, Err(StoreError::Duplicate(_))));
        assert_eq!(store.read_target_score(TargetType::Question, qid).await.unwrap(), Some(1));
        assert_eq!(store.vote_count(TargetType::Question, qid), 1);
    }

    #[tokio::test]
    async fn concurrent_consume_has_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = UserId::new_v4();
            store
                .insert_user(NewUser {
                    id,
                    anon_handle: format!("anon_{id}"),
                    color_seed: 0,
                    created_at: now(),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        let (owner, first, second) = (ids[0], ids[1], ids[2]);
        store
            .update_recovery_hash(owner, "hash".into(), now())
            .await
            .unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.consume_recovery_code(owner, "hash", first, now()).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.consume_recovery_code(owner, "hash", second, now()).await })
        };
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        let winners = outcomes
            .iter()
            .filter(|o| **o == RecoveryConsume::Consumed)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.find_user_by_recovery_hash("hash").await.unwrap(), None);
    }

    #[tokio::test]
    async fn consume_refuses_a_claimant_with_activity() {
        let (store, owner) = store_with_user().await;
        let claimant = UserId::new_v4();
        store
            .insert_user(NewUser {
                id: claimant,
                anon_handle: "anon_b".into(),
                color_seed: 20,
                created_at: now(),
            })
            .await
            .unwrap();
        let q = question(owner, &[]);
        let qid = q.id;
        store.insert_question(q).await.unwrap();
        for voter in [owner, claimant] {
            store
                .insert_vote(NewVote {
                    user_id: voter,
                    target_type: TargetType::Question,
                    target_id: qid,
                    created_at: now(),
                })
                .await
                .unwrap();
        }
        store
            .update_recovery_hash(owner, "hash".into(), now())
            .await
            .unwrap();

        let outcome = store
            .consume_recovery_code(owner, "hash", claimant, now())
            .await
            .unwrap();

        assert_eq!(outcome, RecoveryConsume::ClaimantNotEmpty);
        assert_eq!(store.find_user_by_recovery_hash("hash").await.unwrap(), Some(owner));
        assert_eq!(store.question_author(qid), Some(owner));
        assert_eq!(store.vote_count(TargetType::Question, qid), 2);
        assert_eq!(store.read_target_score(TargetType::Question, qid).await.unwrap(), Some(2));
        let claimant_row = store.get_user(claimant).await.unwrap().unwrap();
        assert_eq!(claimant_row.anon_handle, "anon_b");
    }

    #[test]
    fn reparenting_keeps_colliding_rows_on_the_old_owner() {
        let map: DashMap<TargetKey, u8> = DashMap::new();
        let (from, to) = (UserId::new_v4(), UserId::new_v4());
        let (shared, only_from) = (Uuid::new_v4(), Uuid::new_v4());
        map.insert((from, TargetType::Question, shared), 1);
        map.insert((to, TargetType::Question, shared), 2);
        map.insert((from, TargetType::Answer, only_from), 3);

        InMemoryStore::reparent_keys(&map, from, to);

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&(from, TargetType::Question, shared)).map(|v| *v), Some(1));
        assert_eq!(map.get(&(to, TargetType::Question, shared)).map(|v| *v), Some(2));
        assert_eq!(map.get(&(to, TargetType::Answer, only_from)).map(|v| *v), Some(3));
        assert!(!map.contains_key(&(from, TargetType::Answer, only_from)));
    }

    #[tokio::test]
    async fn deleting_a_question_queues_all_media() {
        let (store, user) = store_with_user().await;
        let q = question(user, &["q/1.png"]);
        let qid = q.id;
        store.insert_question(q).await.unwrap();
        store
            .insert_answer(NewAnswer {
                id: Uuid::new_v4(),
                question_id: qid,
                author_id: user,
                body: "Second floor.".into(),
                image_paths: vec!["a/1.png".into()],
                created_at: now(),
            })
            .await
            .unwrap();

        store.delete_question(qid).await.unwrap();
        let pending = store.pending_media_deletions(200).await.unwrap();
        let paths: Vec<&str> = pending.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["q/1.png", "a/1.png"]);

        store
            .mark_media_deletions_processed(pending.iter().map(|p| p.id).collect(), now())
            .await
            .unwrap();
        assert!(store.pending_media_deletions(200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hiding_is_idempotent() {
        let (store, user) = store_with_user().await;
        let q = question(user, &[]);
        let qid = q.id;
        store.insert_question(q).await.unwrap();

        assert!(store.set_target_hidden(TargetType::Question, qid).await.unwrap());
        assert!(!store.set_target_hidden(TargetType::Question, qid).await.unwrap());
        assert_eq!(
            store.target_status(TargetType::Question, qid).await.unwrap(),
            Some(ContentStatus::Hidden)
        );
    }
}
