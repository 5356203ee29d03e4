//! Backend boundary: traits the viewer consumes and the Postgres implementation.

pub mod grouping;
pub mod story_repo;

use crate::error::Result;
use crate::models::{LikeState, StorySequence};
use sqlx::migrate::Migrator;
use uuid::Uuid;

pub use grouping::{group_into_sequences, StoryRow};
pub use story_repo::PgStoryRepository;

/// Creates `story_likes` and `story_views`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Supplies the identity of the signed-in viewer.
pub trait ViewerIdentity: Send + Sync {
    fn current_viewer_id(&self) -> Option<Uuid>;
}

/// Identity fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticViewer(pub Option<Uuid>);

impl ViewerIdentity for StaticViewer {
    fn current_viewer_id(&self) -> Option<Uuid> {
        self.0
    }
}

/// Read side for story sequences.
#[async_trait::async_trait]
pub trait StoryDataSource: Send + Sync {
    /// Active sequences visible to `viewer_id`, one per owner, newest owner first.
    async fn list_active_story_sequences(
        &self,
        viewer_id: Uuid,
        window_hours: i32,
    ) -> Result<Vec<StorySequence>>;

    /// Record that `viewer_id` has seen `story_id` (idempotent).
    async fn record_view(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()>;
}

/// Remote like storage keyed by (story, viewer).
#[async_trait::async_trait]
pub trait LikeStore: Send + Sync {
    async fn fetch_like_state(&self, story_id: Uuid, viewer_id: Uuid) -> Result<LikeState>;

    async fn insert_like(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()>;

    async fn delete_like(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()>;
}
