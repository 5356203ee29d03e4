/// Configuration management for story-viewer
///
/// Loads configuration from environment variables (a `.env` file is honoured
/// by the binary through dotenvy before this runs).
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Story playback timing
    pub playback: PlaybackConfig,
    /// Story listing window
    pub stories: StoriesConfig,
    /// Like reconciliation
    pub likes: LikesConfig,
    /// Identity of the viewer driving the session
    pub viewer: ViewerConfig,
    /// Log output
    pub log: LogConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Apply bundled migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How long an image story stays on screen
    #[serde(default = "default_image_duration_ms")]
    pub image_duration_ms: u64,
    /// Progress timer resolution for image stories
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Length the headless runner assumes for video stories
    #[serde(default = "default_headless_video_secs")]
    pub headless_video_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoriesConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikesConfig {
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// None means the session runs anonymously
    pub id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub json: bool,
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

// Default values
fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_image_duration_ms() -> u64 {
    5_000
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_headless_video_secs() -> u64 {
    15
}

fn default_window_hours() -> i32 {
    24
}

fn default_remote_timeout_ms() -> u64 {
    5_000
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            image_duration_ms: default_image_duration_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            headless_video_secs: default_headless_video_secs(),
        }
    }
}

impl PlaybackConfig {
    pub fn image_duration(&self) -> Duration {
        Duration::from_millis(self.image_duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("STORY_TICK_INTERVAL_MS must be greater than zero");
        }
        if self.tick_interval_ms > self.image_duration_ms {
            bail!(
                "STORY_TICK_INTERVAL_MS ({}) cannot exceed STORY_IMAGE_DURATION_MS ({})",
                self.tick_interval_ms,
                self.image_duration_ms
            );
        }
        Ok(())
    }
}

impl Default for LikesConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: default_remote_timeout_ms(),
        }
    }
}

impl LikesConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app = AppConfig {
            env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").context("DATABASE_URL environment variable not set")?,
            max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")
                .unwrap_or_else(default_max_connections),
            min_connections: parse_var(&lookup, "DB_MIN_CONNECTIONS")
                .unwrap_or_else(default_min_connections),
            run_migrations: parse_var(&lookup, "DB_RUN_MIGRATIONS").unwrap_or(false),
        };

        let playback = PlaybackConfig {
            image_duration_ms: parse_var(&lookup, "STORY_IMAGE_DURATION_MS")
                .unwrap_or_else(default_image_duration_ms),
            tick_interval_ms: parse_var(&lookup, "STORY_TICK_INTERVAL_MS")
                .unwrap_or_else(default_tick_interval_ms),
            headless_video_secs: parse_var(&lookup, "STORY_HEADLESS_VIDEO_SECS")
                .unwrap_or_else(default_headless_video_secs),
        };
        playback.validate()?;

        let stories = StoriesConfig {
            window_hours: parse_var(&lookup, "STORY_WINDOW_HOURS")
                .unwrap_or_else(default_window_hours),
        };
        if stories.window_hours <= 0 {
            bail!("STORY_WINDOW_HOURS must be positive");
        }

        let likes = LikesConfig {
            remote_timeout_ms: parse_var(&lookup, "LIKE_REMOTE_TIMEOUT_MS")
                .unwrap_or_else(default_remote_timeout_ms),
        };

        let viewer = ViewerConfig {
            id: match lookup("STORY_VIEWER_ID") {
                Some(raw) if !raw.trim().is_empty() => Some(
                    Uuid::parse_str(raw.trim())
                        .with_context(|| format!("STORY_VIEWER_ID is not a UUID: {}", raw))?,
                ),
                _ => None,
            },
        };

        let log = LogConfig {
            json: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        Ok(Config {
            app,
            database,
            playback,
            stories,
            likes,
            viewer,
            log,
        })
    }
}
