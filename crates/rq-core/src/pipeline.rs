//! # Save pipeline
//!
//! Renders a post's raw text, resolves `@mentions` against the thread,
//! diffs them with the mentions recorded on a previous save, persists the
//! post and its mention records and announces the change.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::content::{Owned, Publishable};
use crate::error::Result;
use crate::markup;
use crate::models::{ContentRef, Mention, NewMention, Post, User};
use crate::signals::{PostSignals, PostUpdated};
use crate::thread::{self, AuthorListScope};
use crate::traits::{MentionRepo, PostRepo, SearchPinger, TextRenderer, UserRepo};

pub const DEFAULT_SUMMARY_LENGTH: usize = 120;

/// What happens when an author mentions themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfMentionPolicy {
    /// No mention record and no notification.
    #[default]
    Ignore,
    /// Keep a mention record, but never notify the author.
    RecordOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Maximum characters of the denormalized summary.
    pub summary_length: usize,
    pub self_mentions: SelfMentionPolicy,
    /// Prepended to `{user_id}/{username}` in mention links.
    pub profile_url_prefix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            summary_length: DEFAULT_SUMMARY_LENGTH,
            self_mentions: SelfMentionPolicy::default(),
            profile_url_prefix: "/users/".to_string(),
        }
    }
}

/// Result of [`PostPipeline::parse_post_text`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPost {
    pub html: String,
    /// Resolved users without a mention record from an earlier save.
    pub newly_mentioned_users: Vec<User>,
    /// Earlier mention records whose `@name` is gone from the text.
    pub removed_mentions: Vec<Mention>,
}

/// Result of [`PostPipeline::save_post`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub id: Uuid,
    pub created: bool,
    pub mentions_created: Vec<Mention>,
    pub mentions_removed: Vec<Mention>,
    /// Users announced in the `PostUpdated` event.
    pub notified_users: Vec<User>,
}

/// Collaborators shared by every save.
pub struct PostPipeline {
    pub users: Box<dyn UserRepo>,
    pub posts: Box<dyn PostRepo>,
    pub mentions: Box<dyn MentionRepo>,
    pub renderer: Box<dyn TextRenderer>,
    /// `None` disables the search-engine ping.
    pub pinger: Option<Box<dyn SearchPinger>>,
    pub signals: PostSignals,
    pub options: PipelineOptions,
}

impl PostPipeline {
    /// Render `post` and work out which mentions it adds and drops.
    ///
    /// Text without an `@` after rendering skips mention handling entirely,
    /// no collaborator besides the renderer is consulted.
    pub async fn parse_post_text<P>(&self, post: &P) -> Result<ParsedPost>
    where
        P: Publishable + Sync + ?Sized,
    {
        let flags = post.flags();
        let mut text = post.raw_text().to_string();

        if flags.urlize {
            text = self.renderer.urlize(&text);
        }
        text = if flags.use_markdown {
            self.renderer.render_markdown(&text)
        } else {
            self.renderer.sanitize(&text)
        };

        if !text.contains('@') {
            return Ok(ParsedPost {
                html: text,
                ..ParsedPost::default()
            });
        }

        let candidates = self.anticipated_authors(post, &text).await?;
        let (mentioned, html) =
            markup::mentionize_text(&text, &candidates, &self.options.profile_url_prefix);

        let mut newly_mentioned_users = mentioned;
        let mut removed_mentions = Vec::new();
        if let Some(target) = post.content_ref() {
            for previous in self.mentions.mentions_in(target).await? {
                match newly_mentioned_users
                    .iter()
                    .position(|u| u.id == previous.mentioned_user_id)
                {
                    Some(idx) => {
                        newly_mentioned_users.remove(idx);
                    }
                    None => removed_mentions.push(previous),
                }
            }
        }

        Ok(ParsedPost {
            html,
            newly_mentioned_users,
            removed_mentions,
        })
    }

    /// Thread contributors in contribution order, then users whose name
    /// starts with one of the `@` seeds in `text`.
    async fn anticipated_authors<P>(&self, post: &P, text: &str) -> Result<Vec<User>>
    where
        P: Publishable + Sync + ?Sized,
    {
        let author_ids = match post.origin_post_id() {
            Some(origin) => {
                let posts = self.posts.thread_posts(origin).await?;
                thread::thread_author_ids(origin, &posts, AuthorListScope::FULL_THREAD)
            }
            None => vec![post.last_author_id()],
        };

        let mut by_id: HashMap<Uuid, User> = self
            .users
            .get_users(author_ids.clone())
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let mut candidates: Vec<User> = author_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        for seed in markup::extract_mentioned_name_seeds(text) {
            for user in self.users.find_by_username_prefix(&seed).await? {
                if !candidates.iter().any(|c| c.id == user.id) {
                    candidates.push(user);
                }
            }
        }

        Ok(candidates)
    }

    /// Render, persist and announce `post`. On success `post.id` is set.
    ///
    /// The post row is written before any mention record that points at it.
    pub async fn save_post(&self, post: &mut Post) -> Result<SaveOutcome> {
        let parsed = self.parse_post_text(&*post).await?;

        post.html = parsed.html;
        if post.flags().carries_summary {
            post.summary = Some(markup::summarize(
                &post.html,
                self.options.summary_length,
            ));
        }

        for removed in &parsed.removed_mentions {
            self.mentions.delete_mention(removed.id).await?;
        }

        let created = post.id.is_none();
        let id = self.posts.save_post(post).await?;
        post.id = Some(id);

        let last_author = post.last_author_id();
        let target = ContentRef::new(post.kind, id);

        let mut mentions_created = Vec::new();
        let mut notified_users = Vec::new();
        for user in parsed.newly_mentioned_users {
            let is_self = user.id == last_author;
            if is_self && self.options.self_mentions == SelfMentionPolicy::Ignore {
                continue;
            }
            let mention = self
                .mentions
                .create_mention(NewMention {
                    mentioned_user_id: user.id,
                    mentioned_by_id: last_author,
                    target,
                })
                .await?;
            mentions_created.push(mention);
            if !is_self {
                notified_users.push(user);
            }
        }

        info!(
            post = %target,
            created,
            mentions_added = mentions_created.len(),
            mentions_removed = parsed.removed_mentions.len(),
            "saved post"
        );

        let event = PostUpdated {
            post: target,
            updated_by: last_author,
            newly_mentioned_users: notified_users.clone(),
            timestamp: post.time_of_last_edit(),
            created,
        };
        self.signals.send(&event).await?;

        if let Some(pinger) = &self.pinger {
            if let Err(e) = pinger.ping().await {
                debug!(error = %e, "problem pinging search engines, is the sitemap registered?");
            }
        }

        Ok(SaveOutcome {
            id,
            created,
            mentions_created,
            mentions_removed: parsed.removed_mentions,
            notified_users,
        })
    }
}
