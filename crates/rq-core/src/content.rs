//! # Content building blocks
//!
//! Plain data structs shared by every kind of forum content, plus the traits
//! that give them behavior. A concrete entity such as [`Post`] embeds the
//! structs and implements the traits.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ContentFlags, ContentKind, ContentRef, Post};

pub const REVISION_SUMMARY_MAX_LEN: usize = 300;
pub const SESSION_KEY_MAX_LEN: usize = 40;
pub const ANONYMOUS_SUMMARY_LEN: usize = 180;

/// Content owned by exactly one user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;

    /// Author of the latest edit. Without revision history that is the owner.
    fn last_author_id(&self) -> Uuid {
        self.owner_id()
    }
}

/// Soft-deletion fields, either all set or all cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionState {
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl DeletionState {
    pub fn mark_deleted(&mut self, by: Uuid, at: DateTime<Utc>) {
        self.deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(by);
    }

    pub fn restore(&mut self) {
        *self = Self::default();
    }
}

pub trait Deletable {
    fn deletion(&self) -> &DeletionState;
    fn deletion_mut(&mut self) -> &mut DeletionState;

    fn is_deleted(&self) -> bool {
        self.deletion().deleted
    }

    fn delete(&mut self, by: Uuid) {
        self.deletion_mut().mark_deleted(by, Utc::now());
    }

    fn restore(&mut self) {
        self.deletion_mut().restore();
    }
}

/// Snapshot of a piece of content at one point of its edit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRevision {
    /// 1-based, increasing by one per edit.
    pub revision: u32,
    pub author_id: Uuid,
    pub revised_at: DateTime<Utc>,
    pub summary: String,
    pub text: String,
}

impl ContentRevision {
    pub fn new(
        revision: u32,
        author_id: Uuid,
        revised_at: DateTime<Utc>,
        summary: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self> {
        if revision == 0 {
            return Err(AppError::ValidationError(
                "revision numbers start at 1".to_string(),
            ));
        }
        let summary = summary.into();
        if summary.chars().count() > REVISION_SUMMARY_MAX_LEN {
            return Err(AppError::ValidationError(format!(
                "revision summary exceeds {REVISION_SUMMARY_MAX_LEN} characters"
            )));
        }
        Ok(Self {
            revision,
            author_id,
            revised_at,
            summary,
            text: text.into(),
        })
    }
}

/// Content with an edit history. The last author is whoever wrote the
/// highest revision.
pub trait Revisioned: Owned {
    fn revisions(&self) -> &[ContentRevision];

    fn latest_revision(&self) -> Option<&ContentRevision> {
        self.revisions().iter().max_by_key(|r| r.revision)
    }

    fn next_revision_number(&self) -> u32 {
        self.latest_revision().map_or(1, |r| r.revision + 1)
    }
}

/// Anything the save pipeline can render and scan for mentions.
pub trait Publishable: Owned {
    fn kind(&self) -> ContentKind;
    fn raw_text(&self) -> &str;
    /// `None` while unsaved.
    fn id(&self) -> Option<Uuid>;
    /// Root question of the thread, if one exists yet.
    fn origin_post_id(&self) -> Option<Uuid>;

    fn flags(&self) -> ContentFlags {
        self.kind().flags()
    }

    fn content_ref(&self) -> Option<ContentRef> {
        self.id().map(|id| ContentRef::new(self.kind(), id))
    }
}

impl Owned for Post {
    fn owner_id(&self) -> Uuid {
        self.author_id
    }

    fn last_author_id(&self) -> Uuid {
        self.latest_revision()
            .map_or(self.author_id, |r| r.author_id)
    }
}

impl Deletable for Post {
    fn deletion(&self) -> &DeletionState {
        &self.deletion
    }

    fn deletion_mut(&mut self) -> &mut DeletionState {
        &mut self.deletion
    }
}

impl Revisioned for Post {
    fn revisions(&self) -> &[ContentRevision] {
        &self.revisions
    }
}

impl Publishable for Post {
    fn kind(&self) -> ContentKind {
        self.kind
    }

    fn raw_text(&self) -> &str {
        &self.text
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn origin_post_id(&self) -> Option<Uuid> {
        self.thread_root()
    }
}

impl Post {
    /// Record an edit by `author_id` and make `text` the current text.
    /// Returns the new revision number.
    pub fn revise(
        &mut self,
        author_id: Uuid,
        text: impl Into<String>,
        summary: impl Into<String>,
    ) -> Result<u32> {
        let text = text.into();
        let now = Utc::now();
        let revision = ContentRevision::new(
            self.next_revision_number(),
            author_id,
            now,
            summary,
            text.clone(),
        )?;
        let number = revision.revision;
        self.revisions.push(revision);
        self.text = text;
        self.last_edited_at = Some(now);
        Ok(number)
    }
}

/// The `(type, id)` attachment shared by votes, flags and other records
/// that hang off arbitrary content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaContent {
    pub target: ContentRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn score(&self) -> i32 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub meta: MetaContent,
    pub value: VoteValue,
    pub voted_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(voter_id: Uuid, target: ContentRef, value: VoteValue) -> Self {
        Self {
            id: Uuid::now_v7(),
            voter_id,
            meta: MetaContent { target },
            value,
            voted_at: Utc::now(),
        }
    }
}

/// Net score of the votes cast on `target`.
pub fn score_for(target: ContentRef, votes: &[Vote]) -> i32 {
    votes
        .iter()
        .filter(|v| v.meta.target == target)
        .map(|v| v.value.score())
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedItem {
    pub id: Uuid,
    pub flagged_by: Uuid,
    pub meta: MetaContent,
    pub flagged_at: DateTime<Utc>,
}

impl FlaggedItem {
    pub fn new(flagged_by: Uuid, target: ContentRef) -> Self {
        Self {
            id: Uuid::now_v7(),
            flagged_by,
            meta: MetaContent { target },
            flagged_at: Utc::now(),
        }
    }
}

/// What an anonymous post becomes once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnonymousTarget {
    Question,
    Answer { question: ContentRef },
}

/// A post written before its author had a confirmed account, held by
/// session until it can be published under a real user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousPost {
    pub session_key: String,
    pub wiki: bool,
    pub added_at: DateTime<Utc>,
    pub ip_addr: IpAddr,
    /// Linked once the session belongs to a registered user.
    pub author_id: Option<Uuid>,
    pub text: String,
    pub summary: String,
    pub target: AnonymousTarget,
}

impl AnonymousPost {
    pub fn new(
        session_key: impl Into<String>,
        ip_addr: IpAddr,
        text: impl Into<String>,
        target: AnonymousTarget,
    ) -> Result<Self> {
        let session_key = session_key.into();
        if session_key.is_empty() || session_key.chars().count() > SESSION_KEY_MAX_LEN {
            return Err(AppError::ValidationError(format!(
                "session key must be 1..={SESSION_KEY_MAX_LEN} characters"
            )));
        }
        let text = text.into();
        let summary = text.chars().take(ANONYMOUS_SUMMARY_LEN).collect();
        Ok(Self {
            session_key,
            wiki: false,
            added_at: Utc::now(),
            ip_addr,
            author_id: None,
            text,
            summary,
            target,
        })
    }

    /// Turn the pending content into an unsaved post owned by `author_id`.
    pub fn publish(mut self, author_id: Uuid) -> Post {
        self.author_id = Some(author_id);
        let mut post = Post::question(author_id, self.text);
        if let AnonymousTarget::Answer { question } = self.target {
            post.kind = ContentKind::Answer;
            post.parent = Some(question);
            post.origin_id = Some(question.id);
        }
        post
    }
}
