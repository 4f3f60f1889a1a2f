use integration_tests::Fixture;
use rq_core::models::Post;
use rq_core::pipeline::{PipelineOptions, SelfMentionPolicy};
use rq_core::traits::{MentionRepo, MockSearchPinger, PostRepo};

#[tokio::test]
async fn test_question_lifecycle_tracks_mentions() {
    let fx = Fixture::new().await.unwrap();
    let alice = fx.user("alice").await.unwrap();
    let bob = fx.user("bob").await.unwrap();

    // First save: bob is found through the username prefix lookup.
    let mut question = Post::question(alice.id, "How do I borrow twice? cc @bob");
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();
    let target = question.content_ref().unwrap();

    assert!(outcome.created);
    let notified: Vec<_> = outcome.notified_users.iter().map(|u| u.id).collect();
    assert_eq!(notified, vec![bob.id]);
    assert_eq!(outcome.mentions_created.len(), 1);
    assert!(question
        .html
        .contains(&format!("<a href=\"/users/{}/bob\" class=\"mention\">@bob</a>", bob.id)));

    let stored = fx.store.mentions_in(target).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].mentioned_user_id, bob.id);
    assert_eq!(stored[0].mentioned_by_id, alice.id);

    // Edit: bob's mention goes away, the remaining `@` names the author.
    question
        .revise(alice.id, "How do I borrow twice? solved it @alice", "drop cc")
        .unwrap();
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.mentions_removed.len(), 1);
    assert_eq!(outcome.mentions_removed[0].mentioned_user_id, bob.id);
    assert!(outcome.mentions_created.is_empty());
    assert!(outcome.notified_users.is_empty());
    assert!(fx.store.mentions_in(target).await.unwrap().is_empty());

    // Saving again without changes touches nothing.
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();
    assert!(outcome.mentions_created.is_empty());
    assert!(outcome.mentions_removed.is_empty());

    let events = fx.recorder.events();
    assert_eq!(events.len(), 3);
    assert!(events[0].created);
    assert_eq!(events[0].newly_mentioned_users.len(), 1);
    assert_eq!(events[0].newly_mentioned_users[0].id, bob.id);
    assert!(events[1..].iter().all(|e| !e.created && e.newly_mentioned_users.is_empty()));
    assert!(events.iter().all(|e| e.post == target && e.updated_by == alice.id));
}

#[tokio::test]
async fn test_question_summary_is_stored() {
    let fx = Fixture::new().await.unwrap();
    let alice = fx.user("alice").await.unwrap();

    let body = format!("# Lifetimes\n\n{}", "explain *this* please ".repeat(20));
    let mut question = Post::question(alice.id, body);
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    let stored = fx.store.get_post(outcome.id).await.unwrap().unwrap();
    let summary = stored.summary.unwrap();
    assert!(summary.starts_with("Lifetimes"));
    assert!(summary.chars().count() <= 120);
    assert!(!summary.contains('<'));
    assert!(stored.html.contains("<h1>Lifetimes</h1>"));
    assert!(stored.html.contains("<em>this</em>"));
}

#[tokio::test]
async fn test_unsafe_markup_never_reaches_storage() {
    let fx = Fixture::new().await.unwrap();
    let alice = fx.user("alice").await.unwrap();

    let mut question = Post::question(
        alice.id,
        "<script>alert(1)</script>\n\n[click](javascript:alert(2)) and <b onclick=\"x()\">bold</b>",
    );
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    let stored = fx.store.get_post(outcome.id).await.unwrap().unwrap();
    assert!(!stored.html.contains("script"));
    assert!(!stored.html.contains("javascript"));
    assert!(!stored.html.contains("onclick"));
    assert!(stored.html.contains("<b>bold</b>"));
}

#[tokio::test]
async fn test_self_mention_record_only() {
    let options = PipelineOptions {
        self_mentions: SelfMentionPolicy::RecordOnly,
        ..PipelineOptions::default()
    };
    let fx = Fixture::with_options(options).await.unwrap();
    let alice = fx.user("alice").await.unwrap();

    let mut question = Post::question(alice.id, "reminder for @alice");
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    assert_eq!(outcome.mentions_created.len(), 1);
    assert!(outcome.notified_users.is_empty());
    assert_eq!(fx.store.mentions_of(alice.id).await.unwrap().len(), 1);
    assert!(fx.recorder.events()[0].newly_mentioned_users.is_empty());
}

#[tokio::test]
async fn test_unknown_names_stay_plain_text() {
    let fx = Fixture::new().await.unwrap();
    let alice = fx.user("alice").await.unwrap();

    let mut question = Post::question(alice.id, "mail me at alice@example.com or ask @nobody");
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    assert!(outcome.mentions_created.is_empty());
    assert!(!question.html.contains("class=\"mention\""));
    assert!(question.html.contains("@nobody"));
}

#[tokio::test]
async fn test_failed_ping_keeps_the_saved_post() {
    let mut fx = Fixture::new().await.unwrap();
    let alice = fx.user("alice").await.unwrap();

    let mut pinger = MockSearchPinger::new();
    pinger
        .expect_ping()
        .times(1)
        .returning(|| Err(anyhow::anyhow!("sitemap not registered")));
    fx.pipeline.pinger = Some(Box::new(pinger));

    let mut question = Post::question(alice.id, "Does `Pin` move?");
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    assert!(fx.store.get_post(outcome.id).await.unwrap().is_some());
    assert_eq!(fx.recorder.events().len(), 1);
}

#[tokio::test]
async fn test_mentions_in_image_attributes_stay_inert() {
    let fx = Fixture::new().await.unwrap();
    let alice = fx.user("alice").await.unwrap();
    fx.user("onerror=alert(1)//").await.unwrap();
    fx.user("bob").await.unwrap();

    let mut question = Post::question(
        alice.id,
        "![@onerror=alert(1)//](http://invalid/x.png) and ![@bob](y.png \"@bob\")",
    );
    let outcome = fx.pipeline.save_post(&mut question).await.unwrap();

    assert!(outcome.mentions_created.is_empty());
    assert!(outcome.notified_users.is_empty());

    let stored = fx.store.get_post(outcome.id).await.unwrap().unwrap();
    assert!(!stored.html.contains("<a "));
    assert!(!stored.html.contains("class=\"mention\""));
    assert!(stored.html.contains(r#"alt="@bob""#));
    assert!(stored.html.contains(r#"title="@bob""#));
    assert_eq!(stored.html.matches("<img ").count(), 2);
}
