//! Thread contributor ordering.

use uuid::Uuid;

use crate::content::Revisioned;
use crate::models::{ContentKind, ContentRef, Post};

/// Which parts of a thread count as contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorListScope {
    pub include_comments: bool,
    /// Descend from the question into its answers.
    pub recursive: bool,
}

impl AuthorListScope {
    pub const FULL_THREAD: Self = Self {
        include_comments: true,
        recursive: true,
    };
}

fn push_unique(ids: &mut Vec<Uuid>, id: Uuid) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

fn push_post_authors(ids: &mut Vec<Uuid>, post: &Post) {
    push_unique(ids, post.author_id);
    for revision in post.revisions() {
        push_unique(ids, revision.author_id);
    }
}

fn push_comment_authors(ids: &mut Vec<Uuid>, parent: ContentRef, posts: &[&Post]) {
    posts
        .iter()
        .filter(|p| p.kind == ContentKind::Comment && p.parent == Some(parent))
        .for_each(|c| push_unique(ids, c.author_id));
}

/// Everyone who contributed to the thread rooted at `origin_id`, first
/// contribution first: the question's authors and commenters, then for
/// each non-deleted answer its authors and commenters.
pub fn thread_author_ids(origin_id: Uuid, posts: &[Post], scope: AuthorListScope) -> Vec<Uuid> {
    let mut sorted: Vec<&Post> = posts.iter().collect();
    sorted.sort_by_key(|p| p.added_at);

    let mut ids = Vec::new();
    let Some(root) = sorted.iter().find(|p| p.id == Some(origin_id)) else {
        return ids;
    };
    let root_ref = ContentRef::new(root.kind, origin_id);

    push_post_authors(&mut ids, root);
    if scope.include_comments {
        push_comment_authors(&mut ids, root_ref, &sorted);
    }

    if scope.recursive {
        let answers = sorted.iter().filter(|p| {
            p.kind == ContentKind::Answer
                && p.parent == Some(root_ref)
                && !p.deletion.deleted
        });
        for answer in answers {
            push_post_authors(&mut ids, answer);
            match answer.content_ref() {
                Some(answer_ref) if scope.include_comments => {
                    push_comment_authors(&mut ids, answer_ref, &sorted)
                }
                _ => {}
            }
        }
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn saved(mut post: Post, minutes: i64) -> Post {
        post.id = Some(Uuid::now_v7());
        post.added_at = Utc::now() + Duration::minutes(minutes);
        post
    }

    #[test]
    fn test_structural_order_and_dedup() {
        let (asker, helper, critic, late) = (
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
        );
        let q = saved(Post::question(asker, "q"), 0);
        let a = saved(Post::answer(helper, &q, "a").unwrap(), 1);
        let c_on_a = saved(Post::comment(critic, &a, "c").unwrap(), 2);
        let c_on_q = saved(Post::comment(late, &q, "c").unwrap(), 3);
        let again = saved(Post::comment(helper, &q, "c").unwrap(), 4);
        let origin = q.id.unwrap();

        let posts = vec![again, c_on_a, a, c_on_q, q];
        let ids = thread_author_ids(origin, &posts, AuthorListScope::FULL_THREAD);
        assert_eq!(ids, vec![asker, late, helper, critic]);
    }

    #[test]
    fn test_scope_limits_and_deleted_answers() {
        let (asker, helper, commenter) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let q = saved(Post::question(asker, "q"), 0);
        let mut a = saved(Post::answer(helper, &q, "a").unwrap(), 1);
        let c = saved(Post::comment(commenter, &q, "c").unwrap(), 2);
        let origin = q.id.unwrap();

        let shallow = AuthorListScope {
            include_comments: false,
            recursive: false,
        };
        let posts = vec![q.clone(), a.clone(), c.clone()];
        assert_eq!(thread_author_ids(origin, &posts, shallow), vec![asker]);

        a.deletion.mark_deleted(asker, Utc::now());
        let posts = vec![q, a, c];
        assert_eq!(
            thread_author_ids(origin, &posts, AuthorListScope::FULL_THREAD),
            vec![asker, commenter]
        );
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        assert!(thread_author_ids(Uuid::now_v7(), &[], AuthorListScope::FULL_THREAD).is_empty());
    }
}
