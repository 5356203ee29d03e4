//! Story viewer data structures.
//!
//! Backend rows are shaped into these types at the data-source boundary;
//! nothing past that boundary sees raw query payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single ephemeral story. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
}

/// All active stories of one owner, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorySequence {
    pub owner_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    stories: Vec<Story>,
}

impl StorySequence {
    /// Build a sequence, ordering stories oldest to newest.
    ///
    /// Returns `None` for an empty story list: a sequence always has
    /// something to show.
    pub fn new(
        owner_id: Uuid,
        display_name: impl Into<String>,
        avatar_url: Option<String>,
        mut stories: Vec<Story>,
    ) -> Option<Self> {
        if stories.is_empty() {
            return None;
        }
        stories.sort_by_key(|s| s.created_at);
        Some(Self {
            owner_id,
            display_name: display_name.into(),
            avatar_url,
            stories,
        })
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Never true for a constructed sequence.
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.stories.len() - 1
    }

    pub fn story(&self, index: usize) -> Option<&Story> {
        self.stories.get(index)
    }

    /// Creation time of the newest story, used to order sequences.
    pub fn newest_at(&self) -> DateTime<Utc> {
        self.stories[self.last_index()].created_at
    }
}

/// Like flag and count of one story as seen by the current viewer.
///
/// A liked state always counts the viewer's own like, so its count is at
/// least 1; the count is never negative. `new` enforces both, which keeps
/// `toggled` an involution over every constructible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LikeState {
    is_liked: bool,
    count: i64,
}

impl LikeState {
    pub fn new(is_liked: bool, count: i64) -> Self {
        let floor = if is_liked { 1 } else { 0 };
        Self {
            is_liked,
            count: count.max(floor),
        }
    }

    pub fn is_liked(&self) -> bool {
        self.is_liked
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// The state after flipping the viewer's like.
    pub fn toggled(self) -> Self {
        if self.is_liked {
            Self::new(false, self.count - 1)
        } else {
            Self::new(true, self.count + 1)
        }
    }
}

/// How a story's media is rendered and timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Position of the active story: sequence index and story index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Position {
    pub user_index: usize,
    pub story_index: usize,
}

impl Position {
    pub const fn new(user_index: usize, story_index: usize) -> Self {
        Self {
            user_index,
            story_index,
        }
    }
}

/// Transient playback state of one viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlaybackCursor {
    pub user_index: usize,
    pub story_index: usize,
    /// Always within `0.0..=100.0`
    pub progress_percent: f64,
    pub paused: bool,
}

impl PlaybackCursor {
    pub fn at(position: Position) -> Self {
        Self {
            user_index: position.user_index,
            story_index: position.story_index,
            progress_percent: 0.0,
            paused: false,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.user_index, self.story_index)
    }

    pub fn set_progress(&mut self, percent: f64) {
        self.progress_percent = percent.clamp(0.0, 100.0);
    }
}
