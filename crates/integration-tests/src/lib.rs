//! Shared fixtures for the end-to-end tests: an in-memory SQLite store,
//! the real markup renderer and a handler that records every event.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rq_core::models::User;
use rq_core::pipeline::{PipelineOptions, PostPipeline};
use rq_core::signals::{PostSignals, PostUpdated, PostUpdatedHandler};
use rq_core::traits::UserRepo;
use rq_db_sqlite::SqliteStore;
use rq_markup::MarkupRenderer;

/// Collects `PostUpdated` events for later inspection.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<PostUpdated>>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<PostUpdated> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PostUpdatedHandler for RecordingHandler {
    async fn on_post_updated(&self, event: &PostUpdated) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("event log poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub store: SqliteStore,
    pub pipeline: PostPipeline,
    pub recorder: RecordingHandler,
}

impl Fixture {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_options(PipelineOptions::default()).await
    }

    pub async fn with_options(options: PipelineOptions) -> anyhow::Result<Self> {
        let store = SqliteStore::connect("sqlite::memory:").await?;
        let recorder = RecordingHandler::default();
        let mut signals = PostSignals::new();
        signals.connect(recorder.clone());

        let pipeline = PostPipeline {
            users: Box::new(store.clone()),
            posts: Box::new(store.clone()),
            mentions: Box::new(store.clone()),
            renderer: Box::new(MarkupRenderer::new()),
            pinger: None,
            signals,
            options,
        };
        Ok(Self {
            store,
            pipeline,
            recorder,
        })
    }

    pub async fn user(&self, username: &str) -> anyhow::Result<User> {
        let user = User::new(username);
        self.store.create_user(user.clone()).await?;
        Ok(user)
    }
}
