//! # rq-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rq-core` domain models.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use rq_core::content::{ContentRevision, DeletionState};
use rq_core::models::{ContentKind, ContentRef, Mention, NewMention, Post, User};
use rq_core::traits::{MentionRepo, PostRepo, UserRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id          BLOB PRIMARY KEY,
        username    TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS posts (
        id              BLOB PRIMARY KEY,
        kind            TEXT NOT NULL,
        author_id       BLOB NOT NULL REFERENCES users(id),
        parent_kind     TEXT,
        parent_id       BLOB,
        origin_id       BLOB,
        text            TEXT NOT NULL,
        html            TEXT NOT NULL,
        summary         TEXT,
        deleted         INTEGER NOT NULL DEFAULT 0,
        deleted_at      TEXT,
        deleted_by      BLOB REFERENCES users(id),
        added_at        TEXT NOT NULL,
        last_edited_at  TEXT
    )",
    "CREATE INDEX IF NOT EXISTS posts_origin_idx ON posts (origin_id)",
    "CREATE TABLE IF NOT EXISTS post_revisions (
        post_id     BLOB NOT NULL REFERENCES posts(id),
        revision    INTEGER NOT NULL,
        author_id   BLOB NOT NULL REFERENCES users(id),
        revised_at  TEXT NOT NULL,
        summary     TEXT NOT NULL,
        text        TEXT NOT NULL,
        PRIMARY KEY (post_id, revision)
    )",
    "CREATE TABLE IF NOT EXISTS mentions (
        id                  BLOB PRIMARY KEY,
        mentioned_user_id   BLOB NOT NULL REFERENCES users(id),
        mentioned_by_id     BLOB NOT NULL REFERENCES users(id),
        target_kind         TEXT NOT NULL,
        target_id           BLOB NOT NULL,
        created_at          TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS mentions_target_idx ON mentions (target_kind, target_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS mentions_user_target_idx \
     ON mentions (mentioned_user_id, target_kind, target_id)",
];

const POST_COLUMNS: &str = "id, kind, author_id, parent_kind, parent_id, origin_id, text, html, \
     summary, deleted, deleted_at, deleted_by, added_at, last_edited_at";

/// Users, posts and mentions in one SQLite database. Cloning shares the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and ensures the schema.
    ///
    /// # Developer Note
    /// `sqlite::memory:` gives every connection its own database, so the
    /// pool is pinned to a single long-lived connection in that case.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("sqlite schema ready");
        Ok(())
    }

    async fn revisions_for(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<(Uuid, ContentRevision)>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT post_id, revision, author_id, revised_at, summary, text \
             FROM post_revisions WHERE post_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in post_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY revision ASC");

        query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> anyhow::Result<(Uuid, ContentRevision)> {
                let revision = ContentRevision {
                    revision: u32::try_from(row.try_get::<i64, _>("revision")?)?,
                    author_id: row.try_get("author_id")?,
                    revised_at: row.try_get("revised_at")?,
                    summary: row.try_get("summary")?,
                    text: row.try_get("text")?,
                };
                Ok((row.try_get("post_id")?, revision))
            })
            .collect()
    }

    /// Attaches revision history to freshly loaded posts.
    async fn with_revisions(&self, mut posts: Vec<Post>) -> anyhow::Result<Vec<Post>> {
        let ids: Vec<Uuid> = posts.iter().filter_map(|p| p.id).collect();
        for (post_id, revision) in self.revisions_for(&ids).await? {
            if let Some(post) = posts.iter_mut().find(|p| p.id == Some(post_id)) {
                post.revisions.push(revision);
            }
        }
        Ok(posts)
    }
}

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        created_at: row.try_get("created_at")?,
    })
}

fn post_from_row(row: &SqliteRow) -> anyhow::Result<Post> {
    let parent_kind: Option<String> = row.try_get("parent_kind")?;
    let parent_id: Option<Uuid> = row.try_get("parent_id")?;
    let parent = match (parent_kind, parent_id) {
        (Some(kind), Some(id)) => Some(ContentRef::new(kind.parse()?, id)),
        _ => None,
    };

    Ok(Post {
        id: Some(row.try_get("id")?),
        kind: row.try_get::<String, _>("kind")?.parse::<ContentKind>()?,
        author_id: row.try_get("author_id")?,
        parent,
        origin_id: row.try_get("origin_id")?,
        text: row.try_get("text")?,
        html: row.try_get("html")?,
        summary: row.try_get("summary")?,
        deletion: DeletionState {
            deleted: row.try_get("deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_by: row.try_get("deleted_by")?,
        },
        revisions: Vec::new(),
        added_at: row.try_get("added_at")?,
        last_edited_at: row.try_get("last_edited_at")?,
    })
}

fn mention_from_row(row: &SqliteRow) -> anyhow::Result<Mention> {
    Ok(Mention {
        id: row.try_get("id")?,
        mentioned_user_id: row.try_get("mentioned_user_id")?,
        mentioned_by_id: row.try_get("mentioned_by_id")?,
        target: ContentRef::new(
            row.try_get::<String, _>("target_kind")?.parse()?,
            row.try_get("target_id")?,
        ),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn create_user(&self, user: User) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
            .bind(user.id)
            .bind(user.username.as_str())
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("could not create user '{}'", user.username))?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT id, username, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT id, username, created_at FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn get_users(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT id, username, created_at FROM users WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    /// `LIKE` ignores ASCII case in SQLite, so the prefix is compared with
    /// `substr` to stay case-sensitive.
    async fn find_by_username_prefix(&self, seed: &str) -> anyhow::Result<Vec<User>> {
        sqlx::query(
            "SELECT id, username, created_at FROM users \
             WHERE substr(username, 1, length(?1)) = ?1 ORDER BY username",
        )
        .bind(seed)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(user_from_row)
        .collect()
    }
}

#[async_trait]
impl PostRepo for SqliteStore {
    /// Writes the post row and any revisions not stored yet in one transaction.
    async fn save_post(&self, post: &Post) -> anyhow::Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let id = match post.id {
            None => {
                let id = Uuid::now_v7();
                sqlx::query(&format!(
                    "INSERT INTO posts ({POST_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(id)
                .bind(post.kind.as_str())
                .bind(post.author_id)
                .bind(post.parent.map(|p| p.kind.as_str()))
                .bind(post.parent.map(|p| p.id))
                .bind(post.origin_id)
                .bind(post.text.as_str())
                .bind(post.html.as_str())
                .bind(post.summary.as_deref())
                .bind(post.deletion.deleted)
                .bind(post.deletion.deleted_at)
                .bind(post.deletion.deleted_by)
                .bind(post.added_at)
                .bind(post.last_edited_at)
                .execute(&mut *tx)
                .await?;
                id
            }
            Some(id) => {
                let result = sqlx::query(
                    "UPDATE posts SET text = ?, html = ?, summary = ?, deleted = ?, \
                     deleted_at = ?, deleted_by = ?, last_edited_at = ? WHERE id = ?",
                )
                .bind(post.text.as_str())
                .bind(post.html.as_str())
                .bind(post.summary.as_deref())
                .bind(post.deletion.deleted)
                .bind(post.deletion.deleted_at)
                .bind(post.deletion.deleted_by)
                .bind(post.last_edited_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(anyhow!("post not found with ID {id}"));
                }
                id
            }
        };

        for revision in &post.revisions {
            sqlx::query(
                "INSERT OR IGNORE INTO post_revisions \
                 (post_id, revision, author_id, revised_at, summary, text) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(i64::from(revision.revision))
            .bind(revision.author_id)
            .bind(revision.revised_at)
            .bind(revision.summary.as_str())
            .bind(revision.text.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let post = post_from_row(&row)?;
                Ok(self.with_revisions(vec![post]).await?.pop())
            }
            None => Ok(None),
        }
    }

    async fn thread_posts(&self, origin_id: Uuid) -> anyhow::Result<Vec<Post>> {
        let posts = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?1 OR origin_id = ?1 ORDER BY added_at ASC"
        ))
        .bind(origin_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(post_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

        self.with_revisions(posts).await
    }
}

#[async_trait]
impl MentionRepo for SqliteStore {
    async fn mentions_in(&self, target: ContentRef) -> anyhow::Result<Vec<Mention>> {
        sqlx::query(
            "SELECT id, mentioned_user_id, mentioned_by_id, target_kind, target_id, created_at \
             FROM mentions WHERE target_kind = ? AND target_id = ? ORDER BY created_at ASC",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(mention_from_row)
        .collect()
    }

    async fn mentions_of(&self, user_id: Uuid) -> anyhow::Result<Vec<Mention>> {
        sqlx::query(
            "SELECT id, mentioned_user_id, mentioned_by_id, target_kind, target_id, created_at \
             FROM mentions WHERE mentioned_user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(mention_from_row)
        .collect()
    }

    /// One record per (user, target). Creating an existing pair returns the
    /// stored record unchanged.
    async fn create_mention(&self, mention: NewMention) -> anyhow::Result<Mention> {
        let created = Mention {
            id: Uuid::now_v7(),
            mentioned_user_id: mention.mentioned_user_id,
            mentioned_by_id: mention.mentioned_by_id,
            target: mention.target,
            created_at: Utc::now(),
        };
        let inserted = sqlx::query(
            "INSERT INTO mentions \
             (id, mentioned_user_id, mentioned_by_id, target_kind, target_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (mentioned_user_id, target_kind, target_id) DO NOTHING",
        )
        .bind(created.id)
        .bind(created.mentioned_user_id)
        .bind(created.mentioned_by_id)
        .bind(created.target.kind.as_str())
        .bind(created.target.id)
        .bind(created.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            return Ok(created);
        }

        tracing::debug!(
            user = %created.mentioned_user_id,
            target = %created.target,
            "mention already recorded"
        );
        let row = sqlx::query(
            "SELECT id, mentioned_user_id, mentioned_by_id, target_kind, target_id, created_at \
             FROM mentions WHERE mentioned_user_id = ? AND target_kind = ? AND target_id = ?",
        )
        .bind(created.mentioned_user_id)
        .bind(created.target.kind.as_str())
        .bind(created.target.id)
        .fetch_one(&self.pool)
        .await?;
        mention_from_row(&row)
    }

    async fn delete_mention(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM mentions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::content::{Deletable, Owned};

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    async fn user(store: &SqliteStore, name: &str) -> User {
        let user = User::new(name);
        store.create_user(user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_prefix_lookup_is_case_sensitive() {
        let store = store().await;
        let bob = user(&store, "bob").await;
        let bobby = user(&store, "bobby").await;
        user(&store, "Bobcat").await;

        let found = store.find_by_username_prefix("bob").await.unwrap();
        let names: Vec<&str> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "bobby"]);

        let found = store.get_users(vec![bobby.id, Uuid::now_v7()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, bobby.id);
        assert!(store.get_users(vec![]).await.unwrap().is_empty());

        let by_name = store.get_user_by_username("bob").await.unwrap().unwrap();
        assert_eq!(by_name.id, bob.id);
        assert!(store.get_user(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let store = store().await;
        user(&store, "carol").await;
        assert!(store.create_user(User::new("carol")).await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_reload_thread() {
        let store = store().await;
        let asker = user(&store, "asker").await;
        let editor = user(&store, "editor").await;

        let mut question = Post::question(asker.id, "What is a lifetime?");
        question.summary = Some("What is a lifetime?".to_string());
        let qid = store.save_post(&question).await.unwrap();
        question.id = Some(qid);

        let mut answer = Post::answer(editor.id, &question, "A region of code.").unwrap();
        answer.id = Some(store.save_post(&answer).await.unwrap());

        question.revise(editor.id, "What is a lifetime in Rust?", "clarify").unwrap();
        question.delete(asker.id);
        assert_eq!(store.save_post(&question).await.unwrap(), qid);

        let loaded = store.get_post(qid).await.unwrap().unwrap();
        assert_eq!(loaded.text, "What is a lifetime in Rust?");
        assert_eq!(loaded.revisions.len(), 1);
        assert_eq!(loaded.last_author_id(), editor.id);
        assert!(loaded.is_deleted());
        assert_eq!(loaded.summary.as_deref(), Some("What is a lifetime?"));

        let thread = store.thread_posts(qid).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].parent, question.content_ref());
        assert_eq!(thread[1].origin_id, Some(qid));
    }

    #[tokio::test]
    async fn test_update_of_unknown_post_fails() {
        let store = store().await;
        let asker = user(&store, "asker").await;
        let mut ghost = Post::question(asker.id, "boo");
        ghost.id = Some(Uuid::now_v7());
        assert!(store.save_post(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_mention_records() {
        let store = store().await;
        let asker = user(&store, "asker").await;
        let bob = user(&store, "bob").await;
        let question = Post::question(asker.id, "hey @bob");
        let target = ContentRef::new(ContentKind::Question, store.save_post(&question).await.unwrap());

        let mention = store
            .create_mention(NewMention {
                mentioned_user_id: bob.id,
                mentioned_by_id: asker.id,
                target,
            })
            .await
            .unwrap();
        let found = store.mentions_in(target).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mention.id);
        assert_eq!(found[0].target, target);
        assert_eq!(found[0].mentioned_by_id, asker.id);
        assert_eq!(store.mentions_of(bob.id).await.unwrap().len(), 1);

        store.delete_mention(mention.id).await.unwrap();
        assert!(store.mentions_in(target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mention_is_recorded_once_per_user_and_target() {
        let store = store().await;
        let asker = user(&store, "asker").await;
        let editor = user(&store, "editor").await;
        let bob = user(&store, "bob").await;
        let question = Post::question(asker.id, "hey @bob");
        let target = ContentRef::new(ContentKind::Question, store.save_post(&question).await.unwrap());

        let first = store
            .create_mention(NewMention {
                mentioned_user_id: bob.id,
                mentioned_by_id: asker.id,
                target,
            })
            .await
            .unwrap();
        let again = store
            .create_mention(NewMention {
                mentioned_user_id: bob.id,
                mentioned_by_id: editor.id,
                target,
            })
            .await
            .unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.mentioned_by_id, asker.id);
        let found = store.mentions_in(target).await.unwrap();
        assert_eq!(found.len(), 1);

        // Another target for the same user is a separate record.
        let answer = Post::answer(asker.id, &Post { id: Some(target.id), ..question.clone() }, "@bob").unwrap();
        let answer_ref = ContentRef::new(ContentKind::Answer, store.save_post(&answer).await.unwrap());
        store
            .create_mention(NewMention {
                mentioned_user_id: bob.id,
                mentioned_by_id: asker.id,
                target: answer_ref,
            })
            .await
            .unwrap();
        assert_eq!(store.mentions_of(bob.id).await.unwrap().len(), 2);
    }
}
