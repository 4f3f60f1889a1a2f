//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ContentRef, Mention, NewMention, Post, User};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Account lookups needed to resolve `@name` tokens.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, user: User) -> anyhow::Result<()>;
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    /// Users in no particular order; unknown ids are skipped.
    async fn get_users(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<User>>;
    /// Case-sensitive `username LIKE seed%`.
    async fn find_by_username_prefix(&self, seed: &str) -> anyhow::Result<Vec<User>>;
}

/// Data persistence contract for questions, answers and comments.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Inserts when `post.id` is `None` and returns the assigned id,
    /// otherwise updates the existing row.
    async fn save_post(&self, post: &Post) -> anyhow::Result<Uuid>;
    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// The root question and every answer and comment under it, oldest first.
    async fn thread_posts(&self, origin_id: Uuid) -> anyhow::Result<Vec<Post>>;
}

/// Storage for mention records.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MentionRepo: Send + Sync {
    async fn mentions_in(&self, target: ContentRef) -> anyhow::Result<Vec<Mention>>;
    async fn mentions_of(&self, user_id: Uuid) -> anyhow::Result<Vec<Mention>>;
    async fn create_mention(&self, mention: NewMention) -> anyhow::Result<Mention>;
    async fn delete_mention(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Text to safe html. Implementations must never let unsafe markup through
/// `render_markdown` or `sanitize`.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait TextRenderer: Send + Sync {
    /// Wrap bare URLs in links.
    fn urlize(&self, text: &str) -> String;
    /// Markdown to sanitized html.
    fn render_markdown(&self, text: &str) -> String;
    /// Sanitize text that is already plain text or html.
    fn sanitize(&self, text: &str) -> String;
}

/// Notify search engines that the sitemap changed.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SearchPinger: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}
