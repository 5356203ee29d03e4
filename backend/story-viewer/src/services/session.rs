//! One viewer's story-viewing session.
//!
//! Loads the viewer's active sequences, drives the playback controller, and
//! keeps the like state of whichever story is on screen. Each newly active
//! story is recorded as viewed; view-tracking failures are logged only.

use crate::config::{PlaybackConfig, StoriesConfig};
use crate::db::{StoryDataSource, ViewerIdentity};
use crate::error::{Result, ViewerError};
use crate::models::{LikeState, Story};
use crate::services::likes::LikeReconciler;
use crate::services::playback::{PlaybackController, PlaybackUpdate};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub struct StorySession {
    source: Arc<dyn StoryDataSource>,
    identity: Arc<dyn ViewerIdentity>,
    likes: Arc<LikeReconciler>,
    controller: PlaybackController,
    window_hours: i32,
}

impl StorySession {
    pub fn new(
        source: Arc<dyn StoryDataSource>,
        identity: Arc<dyn ViewerIdentity>,
        likes: Arc<LikeReconciler>,
        playback: &PlaybackConfig,
        stories: &StoriesConfig,
    ) -> Self {
        Self {
            source,
            identity,
            likes,
            controller: PlaybackController::new(playback),
            window_hours: stories.window_hours,
        }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn likes(&self) -> &Arc<LikeReconciler> {
        &self.likes
    }

    pub fn active_story(&self) -> Option<&Story> {
        self.controller.active_story()
    }

    /// Like state of the story on screen, once fetched.
    pub fn focused_like_state(&self) -> Option<LikeState> {
        self.likes.state(self.active_story()?.id)
    }

    /// Load the viewer's sequences and start playing. Anonymous viewers get
    /// the publicly visible stories only.
    pub async fn open(&mut self) -> Result<PlaybackUpdate> {
        let viewer_id = self.identity.current_viewer_id().unwrap_or(Uuid::nil());
        let sequences = self
            .source
            .list_active_story_sequences(viewer_id, self.window_hours)
            .await?;

        let update = self.controller.load_sequences(sequences);
        self.after(update).await;
        Ok(update)
    }

    /// Wait for the next playback update (progress, auto-advance, close).
    pub async fn step(&mut self) -> Option<PlaybackUpdate> {
        let update = self.controller.step().await?;
        self.after(update).await;
        Some(update)
    }

    pub async fn advance(&mut self) -> PlaybackUpdate {
        let update = self.controller.advance();
        self.after(update).await;
        update
    }

    pub async fn retreat(&mut self) -> PlaybackUpdate {
        let update = self.controller.retreat();
        self.after(update).await;
        update
    }

    pub async fn select_owner(&mut self, owner_id: Uuid) -> Result<PlaybackUpdate> {
        let update = self.controller.select_owner(owner_id)?;
        self.after(update).await;
        Ok(update)
    }

    pub fn toggle_pause(&mut self) -> PlaybackUpdate {
        self.controller.toggle_pause()
    }

    pub fn close(&mut self) -> PlaybackUpdate {
        self.controller.close()
    }

    /// Toggle the viewer's like on the story currently on screen.
    pub async fn toggle_like(&self) -> Result<LikeState> {
        let story_id = self
            .active_story()
            .map(|s| s.id)
            .ok_or_else(|| ViewerError::Internal("no story is active".to_string()))?;
        self.likes.toggle(story_id).await
    }

    async fn after(&self, update: PlaybackUpdate) {
        if !matches!(
            update,
            PlaybackUpdate::Started { .. } | PlaybackUpdate::Moved { .. }
        ) {
            return;
        }
        let Some(story_id) = self.active_story().map(|s| s.id) else {
            return;
        };

        if let Some(viewer_id) = self.identity.current_viewer_id() {
            if let Err(e) = self.source.record_view(story_id, viewer_id).await {
                warn!(story_id = %story_id, error = %e, "failed to record story view");
            }
        }

        if let Err(e) = self.likes.focus(story_id).await {
            warn!(story_id = %story_id, error = %e, "failed to load story like state");
        }
    }
}
