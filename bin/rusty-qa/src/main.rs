//! # Rusty-QA Binary
//!
//! Assembles the save pipeline from settings and compile-time features, and
//! exposes it as a small command-line front end.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rq_config::{LogFormat, LogSettings, Settings};
use rq_core::content::Deletable;
use rq_core::models::{Post, User};
use rq_core::pipeline::{PostPipeline, SaveOutcome};
use rq_core::signals::{LogPostUpdates, PostSignals};
use rq_core::traits::{MentionRepo, PostRepo, SearchPinger, UserRepo};
use rq_core::AppError;
use rq_markup::MarkupRenderer;
use secrecy::ExposeSecret;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[cfg(feature = "db-sqlite")]
use rq_db_sqlite::SqliteStore;

#[cfg(feature = "ping-sitemap")]
use rq_ping_sitemap::SitemapPinger;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("rusty-qa needs a storage backend, enable the `db-sqlite` feature");

#[derive(Parser)]
#[command(name = "rusty-qa")]
#[command(about = "Questions, answers and comments with @mentions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user.
    AddUser { username: String },
    /// Ask a question.
    Ask {
        #[arg(short, long)]
        author: String,
        text: String,
    },
    /// Answer a question.
    Answer {
        #[arg(short, long)]
        author: String,
        question: Uuid,
        text: String,
    },
    /// Comment on a question or answer.
    Comment {
        #[arg(short, long)]
        author: String,
        parent: Uuid,
        text: String,
    },
    /// Replace the text of a post, recording a revision.
    Edit {
        #[arg(short, long)]
        author: String,
        post: Uuid,
        text: String,
        #[arg(short, long, default_value = "")]
        summary: String,
    },
    /// List the posts a user was mentioned in.
    Mentions { username: String },
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}

fn build_pinger(settings: &Settings) -> Result<Option<Box<dyn SearchPinger>>> {
    if !settings.ping.enabled {
        return Ok(None);
    }

    #[cfg(feature = "ping-sitemap")]
    {
        let pinger = SitemapPinger::new(
            &settings.ping.endpoint,
            &settings.ping.sitemap_url,
            std::time::Duration::from_secs(settings.ping.timeout_secs),
        )?;
        Ok(Some(Box::new(pinger)))
    }

    #[cfg(not(feature = "ping-sitemap"))]
    {
        tracing::warn!("ping.enabled is set but rusty-qa was built without `ping-sitemap`");
        Ok(None)
    }
}

async fn user_named(users: &dyn UserRepo, username: &str) -> Result<User> {
    users
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string(), username.to_string()).into())
}

async fn post_with_id(posts: &dyn PostRepo, id: Uuid) -> Result<Post> {
    let post = posts
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post".to_string(), id.to_string()))?;
    if post.is_deleted() {
        return Err(AppError::ValidationError(format!("{} {id} is deleted", post.kind)).into());
    }
    Ok(post)
}

fn report(post: &Post, outcome: &SaveOutcome) {
    let verb = if outcome.created { "created" } else { "updated" };
    println!("{verb} {} {}", post.kind, outcome.id);
    for user in &outcome.notified_users {
        println!("  mentioned @{}", user.username);
    }
    for mention in &outcome.mentions_removed {
        println!("  dropped mention of {}", mention.mentioned_user_id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("could not load settings")?;
    init_tracing(&settings.log);

    // 1. Storage
    let store = SqliteStore::connect(settings.database.url.expose_secret())
        .await
        .context("could not open the database")?;

    // 2. Pipeline (dynamic dispatch over the ports)
    let mut signals = PostSignals::new();
    signals.connect(LogPostUpdates);
    let pipeline = PostPipeline {
        users: Box::new(store.clone()),
        posts: Box::new(store.clone()),
        mentions: Box::new(store.clone()),
        renderer: Box::new(MarkupRenderer::new()),
        pinger: build_pinger(&settings)?,
        signals,
        options: settings.pipeline_options(),
    };

    match cli.command {
        Commands::AddUser { username } => {
            if store.get_user_by_username(&username).await?.is_some() {
                return Err(AppError::Conflict(format!("username '{username}' is taken")).into());
            }
            let user = User::new(username);
            store.create_user(user.clone()).await?;
            println!("created user {} {}", user.username, user.id);
        }
        Commands::Ask { author, text } => {
            let author = user_named(&store, &author).await?;
            let mut question = Post::question(author.id, text);
            let outcome = pipeline.save_post(&mut question).await?;
            report(&question, &outcome);
        }
        Commands::Answer {
            author,
            question,
            text,
        } => {
            let author = user_named(&store, &author).await?;
            let question = post_with_id(&store, question).await?;
            let mut answer = Post::answer(author.id, &question, text)?;
            let outcome = pipeline.save_post(&mut answer).await?;
            report(&answer, &outcome);
        }
        Commands::Comment {
            author,
            parent,
            text,
        } => {
            let author = user_named(&store, &author).await?;
            let parent = post_with_id(&store, parent).await?;
            let mut comment = Post::comment(author.id, &parent, text)?;
            let outcome = pipeline.save_post(&mut comment).await?;
            report(&comment, &outcome);
        }
        Commands::Edit {
            author,
            post,
            text,
            summary,
        } => {
            let author = user_named(&store, &author).await?;
            let mut post = post_with_id(&store, post).await?;
            let revision = post.revise(author.id, text, summary)?;
            tracing::debug!(revision, "recorded revision");
            let outcome = pipeline.save_post(&mut post).await?;
            report(&post, &outcome);
        }
        Commands::Mentions { username } => {
            let user = user_named(&store, &username).await?;
            for mention in store.mentions_of(user.id).await? {
                let by = store
                    .get_user(mention.mentioned_by_id)
                    .await?
                    .map_or_else(|| mention.mentioned_by_id.to_string(), |u| u.username);
                println!("{} by @{} at {}", mention.target, by, mention.created_at);
            }
        }
    }

    Ok(())
}
