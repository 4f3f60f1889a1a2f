//! # Domain Models
//!
//! These structs represent the core entities of rusty-qa.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::{ContentRevision, DeletionState};
use crate::error::{AppError, Result};

/// A registered forum account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            created_at: Utc::now(),
        }
    }
}

/// The kinds of content that can carry text and be the target of meta content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Question,
    Answer,
    Comment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Question => "question",
            ContentKind::Answer => "answer",
            ContentKind::Comment => "comment",
        }
    }

    /// Rendering behavior of each kind.
    pub fn flags(&self) -> ContentFlags {
        match self {
            ContentKind::Question => ContentFlags {
                urlize: false,
                use_markdown: true,
                carries_summary: true,
            },
            ContentKind::Answer => ContentFlags {
                urlize: false,
                use_markdown: true,
                carries_summary: false,
            },
            ContentKind::Comment => ContentFlags {
                urlize: true,
                use_markdown: false,
                carries_summary: false,
            },
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "question" => Ok(ContentKind::Question),
            "answer" => Ok(ContentKind::Answer),
            "comment" => Ok(ContentKind::Comment),
            other => Err(AppError::ValidationError(format!(
                "unknown content kind '{other}'"
            ))),
        }
    }
}

/// Per-kind switches consulted by the save pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlags {
    /// Turn bare URLs into links before rendering.
    pub urlize: bool,
    /// Treat the raw text as markdown.
    pub use_markdown: bool,
    /// The kind stores a denormalized plain-text summary next to its html.
    pub carries_summary: bool,
}

/// Typed pointer to any piece of content, the `(type, id)` pair used by
/// mentions, votes and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: Uuid,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A question, answer or comment.
///
/// Shared behavior comes from the building blocks in [`crate::content`]:
/// ownership, soft deletion and revision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Absent until the post is saved for the first time.
    pub id: Option<Uuid>,
    pub kind: ContentKind,
    /// Owning user, fixed at creation.
    pub author_id: Uuid,
    /// The question for an answer, the commented post for a comment.
    pub parent: Option<ContentRef>,
    /// Root question of the thread. `None` for questions.
    pub origin_id: Option<Uuid>,
    pub text: String,
    pub html: String,
    pub summary: Option<String>,
    pub deletion: DeletionState,
    pub revisions: Vec<ContentRevision>,
    pub added_at: DateTime<Utc>,
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl Post {
    fn unsaved(
        kind: ContentKind,
        author_id: Uuid,
        parent: Option<ContentRef>,
        origin_id: Option<Uuid>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind,
            author_id,
            parent,
            origin_id,
            text: text.into(),
            html: String::new(),
            summary: None,
            deletion: DeletionState::default(),
            revisions: Vec::new(),
            added_at: Utc::now(),
            last_edited_at: None,
        }
    }

    pub fn question(author_id: Uuid, text: impl Into<String>) -> Self {
        Self::unsaved(ContentKind::Question, author_id, None, None, text)
    }

    /// Answer to a saved question.
    pub fn answer(author_id: Uuid, question: &Post, text: impl Into<String>) -> Result<Self> {
        if question.kind != ContentKind::Question {
            return Err(AppError::ValidationError(format!(
                "answers must target a question, got {}",
                question.kind
            )));
        }
        let parent = question.require_ref()?;
        Ok(Self::unsaved(
            ContentKind::Answer,
            author_id,
            Some(parent),
            Some(parent.id),
            text,
        ))
    }

    /// Comment on a saved question or answer.
    pub fn comment(author_id: Uuid, parent: &Post, text: impl Into<String>) -> Result<Self> {
        if parent.kind == ContentKind::Comment {
            return Err(AppError::ValidationError(
                "comments cannot be nested".to_string(),
            ));
        }
        let parent_ref = parent.require_ref()?;
        let origin = parent.origin_id.unwrap_or(parent_ref.id);
        Ok(Self::unsaved(
            ContentKind::Comment,
            author_id,
            Some(parent_ref),
            Some(origin),
            text,
        ))
    }

    pub fn content_ref(&self) -> Option<ContentRef> {
        self.id.map(|id| ContentRef::new(self.kind, id))
    }

    fn require_ref(&self) -> Result<ContentRef> {
        self.content_ref().ok_or_else(|| {
            AppError::ValidationError(format!("{} must be saved before it has replies", self.kind))
        })
    }

    /// Root question id, which for a saved question is its own id.
    pub fn thread_root(&self) -> Option<Uuid> {
        self.origin_id.or(self.id)
    }

    pub fn time_of_last_edit(&self) -> DateTime<Utc> {
        self.last_edited_at.unwrap_or(self.added_at)
    }
}

/// Record that a user was referenced with `@username` inside a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: Uuid,
    pub mentioned_user_id: Uuid,
    /// Author whose edit introduced the reference.
    pub mentioned_by_id: Uuid,
    pub target: ContentRef,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::traits::MentionRepo::create_mention`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMention {
    pub mentioned_user_id: Uuid,
    pub mentioned_by_id: Uuid,
    pub target: ContentRef,
}
