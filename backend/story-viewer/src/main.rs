use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use story_viewer::config::Config;
use story_viewer::db::{PgStoryRepository, StaticViewer, MIGRATOR};
use story_viewer::services::playback::progress::MediaHandle;
use story_viewer::services::{LikeReconciler, PlaybackUpdate, StorySession};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Plays a video story without a screen: reports position once a second and
/// ends after `length`. Stops as soon as the story is no longer active.
fn drive_headless_video(handle: MediaHandle, length: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let total = length.as_secs_f64().max(1.0);
        let mut position = 0.0;
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            ticker.tick().await;
            if handle.is_paused() {
                continue;
            }
            position = f64::min(position + 1.0, total);
            if !handle.time_update(position, total) {
                return;
            }
            if position >= total {
                handle.ended();
                return;
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // .env is optional
        eprintln!("No .env loaded: {}", e);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log.json);

    info!(
        "Starting story-viewer: env={}, viewer={}",
        config.app.env,
        config
            .viewer
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    );

    // Prepared statement caching disabled for PgBouncer transaction mode
    let connect_options = PgConnectOptions::from_str(&config.database.url)
        .context("Failed to parse DATABASE_URL")?
        .statement_cache_capacity(0);

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;

    if config.database.run_migrations {
        MIGRATOR
            .run(&pg_pool)
            .await
            .context("Failed to run migrations")?;
        info!("Migrations applied");
    }

    let repository = Arc::new(PgStoryRepository::new(pg_pool));
    let identity = Arc::new(StaticViewer(config.viewer.id));
    let likes = Arc::new(LikeReconciler::new(
        repository.clone(),
        identity.clone(),
        &config.likes,
    ));
    let mut session = StorySession::new(
        repository,
        identity,
        likes,
        &config.playback,
        &config.stories,
    );

    if session.open().await.context("Failed to load stories")? == PlaybackUpdate::Unchanged {
        info!("No active stories to show");
        return Ok(());
    }

    let video_length = Duration::from_secs(config.playback.headless_video_secs);
    let mut video_driver: Option<(u64, JoinHandle<()>)> = None;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        if let Some(handle) = session.controller().media_handle() {
            let epoch = handle.epoch();
            if video_driver.as_ref().map(|(e, _)| *e) != Some(epoch) {
                if let Some((_, task)) = video_driver.take() {
                    task.abort();
                }
                video_driver = Some((epoch, drive_headless_video(handle, video_length)));
            }
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                session.close();
                break;
            }
            update = session.step() => match update {
                Some(PlaybackUpdate::Moved { from, to }) => {
                    let snapshot = session.controller().snapshot();
                    info!(
                        from_user = from.user_index,
                        from_story = from.story_index,
                        to_user = to.user_index,
                        to_story = to.story_index,
                        story_id = ?snapshot.story_id,
                        kind = ?snapshot.media_kind,
                        likes = ?session.focused_like_state().map(|s| s.count()),
                        "Story advanced"
                    );
                }
                Some(PlaybackUpdate::Closed) | None => break,
                Some(_) => {}
            }
        }
    }

    if let Some((_, task)) = video_driver.take() {
        task.abort();
    }
    info!("story-viewer finished");
    Ok(())
}
