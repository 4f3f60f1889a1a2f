//! # Post signals
//!
//! In-process fan-out of "post updated" events to any number of subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContentRef, User};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Emitted once per successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostUpdated {
    pub post: ContentRef,
    pub updated_by: Uuid,
    /// Never contains `updated_by`.
    pub newly_mentioned_users: Vec<User>,
    pub timestamp: DateTime<Utc>,
    pub created: bool,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PostUpdatedHandler: Send + Sync {
    async fn on_post_updated(&self, event: &PostUpdated) -> anyhow::Result<()>;
}

/// Ordered subscriber registry.
#[derive(Default)]
pub struct PostSignals {
    handlers: Vec<Box<dyn PostUpdatedHandler>>,
}

impl PostSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, handler: impl PostUpdatedHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Calls every handler in connection order, stopping at the first error.
    pub async fn send(&self, event: &PostUpdated) -> anyhow::Result<()> {
        for handler in &self.handlers {
            handler.on_post_updated(event).await?;
        }
        Ok(())
    }
}

/// Subscriber that writes each event to the log.
pub struct LogPostUpdates;

#[async_trait]
impl PostUpdatedHandler for LogPostUpdates {
    async fn on_post_updated(&self, event: &PostUpdated) -> anyhow::Result<()> {
        let mentioned: Vec<&str> = event
            .newly_mentioned_users
            .iter()
            .map(|u| u.username.as_str())
            .collect();
        tracing::info!(
            post = %event.post,
            updated_by = %event.updated_by,
            created = event.created,
            mentioned = ?mentioned,
            "post updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;
    use mockall::Sequence;

    fn event() -> PostUpdated {
        PostUpdated {
            post: ContentRef::new(ContentKind::Question, Uuid::now_v7()),
            updated_by: Uuid::now_v7(),
            newly_mentioned_users: vec![],
            timestamp: Utc::now(),
            created: true,
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let mut seq = Sequence::new();
        let mut first = MockPostUpdatedHandler::new();
        first
            .expect_on_post_updated()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut second = MockPostUpdatedHandler::new();
        second
            .expect_on_post_updated()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut signals = PostSignals::new();
        signals.connect(first);
        signals.connect(second);
        signals.connect(LogPostUpdates);
        assert_eq!(signals.len(), 3);

        signals.send(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_error_stops_dispatch() {
        let mut failing = MockPostUpdatedHandler::new();
        failing
            .expect_on_post_updated()
            .returning(|_| Err(anyhow::anyhow!("subscriber down")));
        let mut never = MockPostUpdatedHandler::new();
        never.expect_on_post_updated().never();

        let mut signals = PostSignals::new();
        signals.connect(failing);
        signals.connect(never);

        let err = signals.send(&event()).await.unwrap_err();
        assert_eq!(err.to_string(), "subscriber down");
    }
}
