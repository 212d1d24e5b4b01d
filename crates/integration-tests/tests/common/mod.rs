//! Shared harness: the real façade over the in-memory store with a clock
//! the test controls.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::SecretString;

use auth_adapters::HmacCodeHasher;
use domains::models::UserId;
use domains::ports::Clock;
use services::facade::{CreateAnswerInput, CreateQuestionInput};
use services::{ActionFacade, FacadePorts, FixedThreshold, ModerationPolicy, RateLimitTable};
use storage_adapters::{InMemoryMediaStorage, InMemoryStore};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).single().unwrap();
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub media: Arc<InMemoryMediaStorage>,
    pub clock: Arc<ManualClock>,
    pub hasher: Arc<HmacCodeHasher>,
    pub facade: ActionFacade,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(Arc::new(FixedThreshold { threshold: 3 }))
    }

    pub fn with_policy(policy: Arc<dyn ModerationPolicy>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let media = Arc::new(InMemoryMediaStorage::new());
        let clock = Arc::new(ManualClock::new());
        let hasher = Arc::new(
            HmacCodeHasher::new(&SecretString::from("integration-pepper".to_string())).unwrap(),
        );

        let facade = ActionFacade::new(FacadePorts {
            identities: store.clone(),
            events: store.clone(),
            content: store.clone(),
            media: media.clone(),
            hasher: hasher.clone(),
            policy,
            clock: clock.clone(),
            rate_limits: RateLimitTable::standard(),
            sweep_batch: 200,
        });

        Self {
            store,
            media,
            clock,
            hasher,
            facade,
        }
    }

    /// A user whose identity row already exists.
    pub async fn user(&self) -> UserId {
        let id = UserId::new_v4();
        self.facade.profile_ready(id).await.unwrap();
        id
    }

    pub async fn ask(&self, author: UserId, title: &str) -> String {
        self.facade
            .create_question(author, question(title))
            .await
            .unwrap()
            .id
            .to_string()
    }

    pub async fn answer(&self, author: UserId, question_id: &str) -> String {
        self.facade
            .create_answer(
                author,
                CreateAnswerInput {
                    question_id: question_id.to_string(),
                    body: "Check the registrar's office on the ground floor.".into(),
                    image_paths: vec![],
                },
            )
            .await
            .unwrap()
            .id
            .to_string()
    }
}

pub fn question(title: &str) -> CreateQuestionInput {
    CreateQuestionInput {
        title: title.to_string(),
        body: "Does anyone know how this works?".into(),
        category: "academic".into(),
        tags: vec!["Course Reg".into()],
        image_paths: vec![],
    }
}
