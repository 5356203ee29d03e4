//! Story playback state machine.
//!
//! State transitions:
//! - Idle → PlayingImage | PlayingVideo: sequences loaded, media kind of (0, 0)
//! - Playing* → Playing*: advance / retreat / external selection
//! - Playing* ⇄ Paused: pause / resume (progress kept)
//! - any → Closed: close, or advance past the last story of the last owner
//!
//! The controller owns the only `PlaybackCursor` of a session. Progress
//! sources are swapped atomically on every story change: the old one is torn
//! down and the epoch bumped before the new one is attached, and events from
//! any earlier epoch are discarded.

pub mod progress;

use crate::config::PlaybackConfig;
use crate::error::{Result, ViewerError};
use crate::metrics;
use crate::models::{MediaKind, PlaybackCursor, Position, Story, StorySequence};
use crate::services::media::{classify, MediaRef};
use progress::{
    ImageTimer, MediaHandle, PlaybackEvent, ProgressSource, SourceEvent, VideoSubscription,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    /// Nothing loaded yet, or nothing to show
    Idle,
    PlayingImage,
    PlayingVideo,
    Paused { resume_as: MediaKind },
    /// Terminal
    Closed,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::PlayingImage | PlaybackState::PlayingVideo)
    }

    /// A story is on screen (playing or paused).
    pub fn is_active(&self) -> bool {
        self.is_playing() || matches!(self, PlaybackState::Paused { .. })
    }

    fn playing(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => PlaybackState::PlayingImage,
            MediaKind::Video => PlaybackState::PlayingVideo,
        }
    }
}

/// Visible effect of an operation or event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackUpdate {
    Unchanged,
    Started { at: Position },
    Progress { percent: f64 },
    Moved { from: Position, to: Position },
    Paused,
    Resumed,
    Closed,
}

/// Read-only view of the controller published to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub cursor: PlaybackCursor,
    pub story_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub media_kind: Option<MediaKind>,
}

/// Progress source bookkeeping; `attached - detached` is the number of live sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub attached: u64,
    pub detached: u64,
}

impl SourceStats {
    pub fn live(&self) -> u64 {
        self.attached - self.detached
    }
}

pub struct PlaybackController {
    sequences: Vec<StorySequence>,
    cursor: PlaybackCursor,
    state: PlaybackState,
    source: Option<Box<dyn ProgressSource>>,
    epoch: u64,
    tick: Duration,
    ticks_per_story: u64,
    elapsed_ticks: u64,
    stats: SourceStats,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    snapshots: watch::Sender<PlaybackSnapshot>,
}

impl PlaybackController {
    pub fn new(config: &PlaybackConfig) -> Self {
        let tick = config.tick_interval().max(Duration::from_millis(1));
        let duration = config.image_duration().max(tick);
        let ticks_per_story = duration.as_millis().div_ceil(tick.as_millis()).max(1) as u64;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(PlaybackSnapshot {
            state: PlaybackState::Idle,
            cursor: PlaybackCursor::default(),
            story_id: None,
            owner_id: None,
            media_kind: None,
        });

        Self {
            sequences: Vec::new(),
            cursor: PlaybackCursor::default(),
            state: PlaybackState::Idle,
            source: None,
            epoch: 0,
            tick,
            ticks_per_story,
            elapsed_ticks: 0,
            stats: SourceStats::default(),
            events_tx,
            events_rx,
            snapshots,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    pub fn active_sequence(&self) -> Option<&StorySequence> {
        if !self.state.is_active() {
            return None;
        }
        self.sequences.get(self.cursor.user_index)
    }

    pub fn active_story(&self) -> Option<&Story> {
        self.active_sequence()?.story(self.cursor.story_index)
    }

    /// Media kind of the live progress source.
    pub fn active_kind(&self) -> Option<MediaKind> {
        self.source.as_ref().map(|s| s.kind())
    }

    /// Renderer handle for the active video story.
    pub fn media_handle(&self) -> Option<MediaHandle> {
        self.source.as_ref().and_then(|s| s.media_handle())
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            cursor: self.cursor,
            story_id: self.active_story().map(|s| s.id),
            owner_id: self.active_sequence().map(|s| s.owner_id),
            media_kind: self.active_kind(),
        }
    }

    /// Load the session's sequences and start at the first story of the first owner.
    ///
    /// An empty list leaves the controller idle: nothing to show is not an error.
    /// Loading into a closed controller is ignored. Image timers are tokio
    /// tasks, so this must run inside a runtime.
    pub fn load_sequences(&mut self, sequences: Vec<StorySequence>) -> PlaybackUpdate {
        if self.state == PlaybackState::Closed {
            return PlaybackUpdate::Unchanged;
        }

        self.detach_source();
        self.sequences = sequences.into_iter().filter(|s| !s.is_empty()).collect();

        if self.sequences.is_empty() {
            debug!("no active stories to show");
            self.state = PlaybackState::Idle;
            self.cursor = PlaybackCursor::default();
            self.publish();
            return PlaybackUpdate::Unchanged;
        }

        let at = Position::new(0, 0);
        self.enter(at);
        PlaybackUpdate::Started { at }
    }

    /// Move forward one story, crossing into the next owner at a boundary.
    /// Advancing past the very last story closes the viewer.
    pub fn advance(&mut self) -> PlaybackUpdate {
        if !self.state.is_active() {
            return PlaybackUpdate::Unchanged;
        }
        let from = self.cursor.position();

        match self.next_position(from) {
            Some(to) => {
                metrics::record_transition("advance");
                self.enter(to);
                PlaybackUpdate::Moved { from, to }
            }
            None => self.close(),
        }
    }

    /// Move back one story, crossing into the previous owner's last story at a
    /// boundary. At the first story of the first owner this is a no-op.
    pub fn retreat(&mut self) -> PlaybackUpdate {
        if !self.state.is_active() {
            return PlaybackUpdate::Unchanged;
        }
        let from = self.cursor.position();

        match self.previous_position(from) {
            Some(to) => {
                metrics::record_transition("retreat");
                self.enter(to);
                PlaybackUpdate::Moved { from, to }
            }
            None => PlaybackUpdate::Unchanged,
        }
    }

    /// Jump to the first story of the sequence at `user_index`.
    pub fn select_sequence(&mut self, user_index: usize) -> Result<PlaybackUpdate> {
        if !self.state.is_active() {
            return Ok(PlaybackUpdate::Unchanged);
        }
        if user_index >= self.sequences.len() {
            return Err(ViewerError::UnknownSequence(user_index));
        }

        let from = self.cursor.position();
        let to = Position::new(user_index, 0);
        metrics::record_transition("select");
        self.enter(to);
        Ok(PlaybackUpdate::Moved { from, to })
    }

    /// Jump to the first story of `owner_id`'s sequence.
    pub fn select_owner(&mut self, owner_id: Uuid) -> Result<PlaybackUpdate> {
        match self.sequences.iter().position(|s| s.owner_id == owner_id) {
            Some(index) => self.select_sequence(index),
            None => Err(ViewerError::UnknownOwner(owner_id)),
        }
    }

    pub fn pause(&mut self) -> PlaybackUpdate {
        let resume_as = match self.state {
            PlaybackState::PlayingImage => MediaKind::Image,
            PlaybackState::PlayingVideo => MediaKind::Video,
            _ => return PlaybackUpdate::Unchanged,
        };
        if let Some(source) = self.source.as_mut() {
            source.pause();
        }
        self.state = PlaybackState::Paused { resume_as };
        self.cursor.paused = true;
        self.publish();
        PlaybackUpdate::Paused
    }

    pub fn resume(&mut self) -> PlaybackUpdate {
        let PlaybackState::Paused { resume_as } = self.state else {
            return PlaybackUpdate::Unchanged;
        };
        if let Some(source) = self.source.as_mut() {
            source.resume();
        }
        self.state = PlaybackState::playing(resume_as);
        self.cursor.paused = false;
        self.publish();
        PlaybackUpdate::Resumed
    }

    pub fn toggle_pause(&mut self) -> PlaybackUpdate {
        if self.state.is_playing() {
            self.pause()
        } else {
            self.resume()
        }
    }

    /// Dismiss the viewer. Tears the live source down before returning;
    /// nothing advances after this.
    pub fn close(&mut self) -> PlaybackUpdate {
        if self.state == PlaybackState::Closed {
            return PlaybackUpdate::Unchanged;
        }
        self.detach_source();
        self.epoch += 1;
        self.state = PlaybackState::Closed;
        self.cursor.paused = false;
        metrics::record_transition("close");
        info!(stories = self.total_stories(), "story viewer closed");
        self.publish();
        PlaybackUpdate::Closed
    }

    /// Apply one progress event. Events from a previous story, or arriving
    /// while paused or closed, are ignored.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> Option<PlaybackUpdate> {
        if event.epoch != self.epoch {
            debug!(
                event_epoch = event.epoch,
                epoch = self.epoch,
                "dropping stale progress event"
            );
            return None;
        }

        match (self.state, event.event) {
            (PlaybackState::PlayingImage, SourceEvent::Tick) => {
                self.elapsed_ticks += 1;
                if self.elapsed_ticks >= self.ticks_per_story {
                    self.cursor.set_progress(100.0);
                    return Some(self.advance());
                }
                let percent = self.elapsed_ticks as f64 * 100.0 / self.ticks_per_story as f64;
                self.cursor.set_progress(percent);
                self.publish();
                Some(PlaybackUpdate::Progress {
                    percent: self.cursor.progress_percent,
                })
            }
            (
                PlaybackState::PlayingVideo,
                SourceEvent::TimeUpdate {
                    position_secs,
                    duration_secs,
                },
            ) => {
                if !(duration_secs.is_finite() && duration_secs > 0.0)
                    || !position_secs.is_finite()
                {
                    return None;
                }
                self.cursor.set_progress(position_secs / duration_secs * 100.0);
                self.publish();
                Some(PlaybackUpdate::Progress {
                    percent: self.cursor.progress_percent,
                })
            }
            (PlaybackState::PlayingVideo, SourceEvent::Ended) => Some(self.advance()),
            _ => None,
        }
    }

    /// Wait for the next live progress event and apply it.
    ///
    /// Returns `None` immediately when nothing is playing. In video mode this
    /// waits on the renderer's media reports.
    pub async fn step(&mut self) -> Option<PlaybackUpdate> {
        loop {
            if !self.state.is_playing() {
                return None;
            }
            let event = self.events_rx.recv().await?;
            if let Some(update) = self.handle_event(event) {
                return Some(update);
            }
        }
    }

    fn total_stories(&self) -> usize {
        self.sequences.iter().map(|s| s.len()).sum()
    }

    fn next_position(&self, from: Position) -> Option<Position> {
        let current = self.sequences.get(from.user_index)?;
        if from.story_index + 1 < current.len() {
            return Some(Position::new(from.user_index, from.story_index + 1));
        }
        if from.user_index + 1 < self.sequences.len() {
            return Some(Position::new(from.user_index + 1, 0));
        }
        None
    }

    fn previous_position(&self, from: Position) -> Option<Position> {
        if from.story_index > 0 {
            return Some(Position::new(from.user_index, from.story_index - 1));
        }
        if from.user_index > 0 {
            let previous = self.sequences.get(from.user_index - 1)?;
            return Some(Position::new(from.user_index - 1, previous.last_index()));
        }
        None
    }

    /// Make `to` the active story: tear down, bump epoch, attach.
    fn enter(&mut self, to: Position) {
        self.detach_source();
        self.epoch += 1;
        self.cursor = PlaybackCursor::at(to);
        self.elapsed_ticks = 0;

        let Some(story) = self
            .sequences
            .get(to.user_index)
            .and_then(|seq| seq.story(to.story_index))
        else {
            // positions are only produced from loaded sequences
            self.state = PlaybackState::Idle;
            self.publish();
            return;
        };

        let kind = classify(MediaRef::Url(&story.media_url));
        let story_id = story.id;
        let source: Box<dyn ProgressSource> = match kind {
            MediaKind::Image => Box::new(ImageTimer::start(
                self.epoch,
                self.tick,
                self.events_tx.clone(),
            )),
            MediaKind::Video => Box::new(VideoSubscription::attach(
                self.epoch,
                self.events_tx.clone(),
            )),
        };
        debug_assert_eq!(source.epoch(), self.epoch);
        self.source = Some(source);
        self.stats.attached += 1;
        self.state = PlaybackState::playing(kind);

        debug!(
            story_id = %story_id,
            user_index = to.user_index,
            story_index = to.story_index,
            kind = kind.as_str(),
            epoch = self.epoch,
            "story activated"
        );
        self.publish();
    }

    fn detach_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.teardown();
            self.stats.detached += 1;
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.detach_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sequence(urls: &[&str]) -> StorySequence {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let stories = urls
            .iter()
            .enumerate()
            .map(|(i, url)| Story {
                id: Uuid::new_v4(),
                owner_id: owner,
                media_url: url.to_string(),
                created_at: now + chrono::Duration::seconds(i as i64),
            })
            .collect();
        StorySequence::new(owner, "owner", None, stories).unwrap()
    }

    fn controller() -> PlaybackController {
        PlaybackController::new(&PlaybackConfig::default())
    }

    #[tokio::test]
    async fn test_empty_load_stays_idle() {
        let mut ctl = controller();
        assert_eq!(ctl.load_sequences(vec![]), PlaybackUpdate::Unchanged);
        assert_eq!(ctl.state(), PlaybackState::Idle);
        assert_eq!(ctl.advance(), PlaybackUpdate::Unchanged);
        assert!(ctl.step().await.is_none());
    }

    #[tokio::test]
    async fn test_load_picks_source_by_media_kind() {
        let mut ctl = controller();
        ctl.load_sequences(vec![sequence(&["https://cdn/x/a.mp4", "https://cdn/x/b.jpg"])]);
        assert_eq!(ctl.state(), PlaybackState::PlayingVideo);
        assert!(ctl.media_handle().is_some());

        ctl.advance();
        assert_eq!(ctl.state(), PlaybackState::PlayingImage);
        assert!(ctl.media_handle().is_none());
    }

    #[tokio::test]
    async fn test_retreat_crosses_to_previous_owner_last_story() {
        let mut ctl = controller();
        ctl.load_sequences(vec![
            sequence(&["https://cdn/a/1.jpg", "https://cdn/a/2.jpg", "https://cdn/a/3.jpg"]),
            sequence(&["https://cdn/b/1.jpg"]),
        ]);
        ctl.select_sequence(1).unwrap();

        let update = ctl.retreat();
        assert_eq!(
            update,
            PlaybackUpdate::Moved {
                from: Position::new(1, 0),
                to: Position::new(0, 2)
            }
        );
    }

    #[tokio::test]
    async fn test_video_progress_mirrors_position() {
        let mut ctl = controller();
        ctl.load_sequences(vec![sequence(&["https://cdn/x/a.webm"])]);
        let epoch = ctl.epoch();

        let update = ctl.handle_event(PlaybackEvent {
            epoch,
            event: SourceEvent::TimeUpdate {
                position_secs: 2.5,
                duration_secs: 10.0,
            },
        });
        assert_eq!(update, Some(PlaybackUpdate::Progress { percent: 25.0 }));

        // unknown duration is ignored
        let update = ctl.handle_event(PlaybackEvent {
            epoch,
            event: SourceEvent::TimeUpdate {
                position_secs: 2.5,
                duration_secs: f64::NAN,
            },
        });
        assert_eq!(update, None);
        assert_eq!(ctl.cursor().progress_percent, 25.0);
    }

    #[tokio::test]
    async fn test_pause_keeps_progress_and_ignores_events() {
        let mut ctl = controller();
        ctl.load_sequences(vec![sequence(&["https://cdn/x/a.mov"])]);
        let epoch = ctl.epoch();
        ctl.handle_event(PlaybackEvent {
            epoch,
            event: SourceEvent::TimeUpdate {
                position_secs: 5.0,
                duration_secs: 10.0,
            },
        });

        assert_eq!(ctl.pause(), PlaybackUpdate::Paused);
        assert!(ctl.cursor().paused);
        assert!(ctl.media_handle().unwrap().is_paused());
        assert_eq!(
            ctl.handle_event(PlaybackEvent {
                epoch,
                event: SourceEvent::Ended
            }),
            None
        );

        assert_eq!(ctl.toggle_pause(), PlaybackUpdate::Resumed);
        assert_eq!(ctl.state(), PlaybackState::PlayingVideo);
        assert_eq!(ctl.cursor().progress_percent, 50.0);
    }

    #[tokio::test]
    async fn test_navigation_while_paused_plays_new_story() {
        let mut ctl = controller();
        ctl.load_sequences(vec![sequence(&["https://cdn/a/1.jpg", "https://cdn/a/2.jpg"])]);
        ctl.pause();

        ctl.advance();
        assert_eq!(ctl.state(), PlaybackState::PlayingImage);
        assert!(!ctl.cursor().paused);
    }

    #[tokio::test]
    async fn test_select_unknown_sequence_is_error() {
        let mut ctl = controller();
        ctl.load_sequences(vec![sequence(&["https://cdn/a/1.jpg"])]);
        assert!(matches!(
            ctl.select_sequence(4),
            Err(ViewerError::UnknownSequence(4))
        ));
        assert!(ctl.select_owner(Uuid::new_v4()).is_err());
        assert_eq!(ctl.cursor().position(), Position::new(0, 0));
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let mut ctl = controller();
        ctl.load_sequences(vec![sequence(&["https://cdn/a/1.jpg"])]);
        assert_eq!(ctl.close(), PlaybackUpdate::Closed);
        assert_eq!(ctl.close(), PlaybackUpdate::Unchanged);
        assert_eq!(
            ctl.load_sequences(vec![sequence(&["https://cdn/a/1.jpg"])]),
            PlaybackUpdate::Unchanged
        );
        assert_eq!(ctl.stats().live(), 0);
        assert!(ctl.active_story().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_published_to_subscribers() {
        let mut ctl = controller();
        let rx = ctl.subscribe();
        let seq = sequence(&["https://cdn/a/1.jpg"]);
        let story_id = seq.stories()[0].id;
        ctl.load_sequences(vec![seq]);

        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.state, PlaybackState::PlayingImage);
        assert_eq!(snapshot.story_id, Some(story_id));
        assert_eq!(snapshot.media_kind, Some(MediaKind::Image));
    }
}
