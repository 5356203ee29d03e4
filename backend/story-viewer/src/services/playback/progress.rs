//! Progress sources driving story playback.
//!
//! Exactly one source is live per active story: a tick timer for images or a
//! media subscription for videos. Every event is stamped with the epoch of the
//! story it was created for so the controller can drop events that outlive
//! their source.

use crate::models::MediaKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Event emitted by a progress source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent {
    /// One timer period elapsed (image mode)
    Tick,
    /// Media playback position changed (video mode)
    TimeUpdate { position_secs: f64, duration_secs: f64 },
    /// Media reached its end (video mode)
    Ended,
}

/// A source event tagged with the epoch of the story it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackEvent {
    pub epoch: u64,
    pub event: SourceEvent,
}

/// Something that reports playback progress for the active story.
pub trait ProgressSource: Send {
    fn kind(&self) -> MediaKind;

    fn epoch(&self) -> u64;

    /// Freeze progress without losing position.
    fn pause(&mut self);

    fn resume(&mut self);

    /// Stop emitting events. Must be synchronous and idempotent.
    fn teardown(&mut self);

    /// Handle for the renderer to report media events, if this source has one.
    fn media_handle(&self) -> Option<MediaHandle> {
        None
    }
}

/// Fixed-interval ticker for image stories.
pub struct ImageTimer {
    epoch: u64,
    period: Duration,
    tx: UnboundedSender<PlaybackEvent>,
    task: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl ImageTimer {
    /// Start ticking immediately. Must be called within a tokio runtime.
    pub fn start(epoch: u64, period: Duration, tx: UnboundedSender<PlaybackEvent>) -> Self {
        let mut timer = Self {
            epoch,
            period,
            tx,
            task: None,
            torn_down: false,
        };
        timer.spawn();
        timer
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    fn spawn(&mut self) {
        if self.torn_down || self.task.is_some() {
            return;
        }
        let epoch = self.epoch;
        let period = self.period;
        let tx = self.tx.clone();

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let event = PlaybackEvent {
                    epoch,
                    event: SourceEvent::Tick,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl ProgressSource for ImageTimer {
    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn pause(&mut self) {
        self.stop();
    }

    fn resume(&mut self) {
        self.spawn();
    }

    fn teardown(&mut self) {
        self.torn_down = true;
        self.stop();
    }
}

impl Drop for ImageTimer {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[derive(Debug, Default)]
struct MediaControl {
    attached: AtomicBool,
    paused: AtomicBool,
}

/// Subscription to the renderer's media element for video stories.
pub struct VideoSubscription {
    epoch: u64,
    control: Arc<MediaControl>,
    tx: UnboundedSender<PlaybackEvent>,
}

impl VideoSubscription {
    pub fn attach(epoch: u64, tx: UnboundedSender<PlaybackEvent>) -> Self {
        let control = Arc::new(MediaControl::default());
        control.attached.store(true, Ordering::SeqCst);
        Self { epoch, control, tx }
    }
}

impl ProgressSource for VideoSubscription {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn pause(&mut self) {
        self.control.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.control.paused.store(false, Ordering::SeqCst);
    }

    fn teardown(&mut self) {
        self.control.attached.store(false, Ordering::SeqCst);
    }

    fn media_handle(&self) -> Option<MediaHandle> {
        Some(MediaHandle {
            epoch: self.epoch,
            control: Arc::clone(&self.control),
            tx: self.tx.clone(),
        })
    }
}

impl Drop for VideoSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Renderer-side handle for one video story.
///
/// Reports are refused once the story is no longer active; a handle never
/// outlives the story it was issued for.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    epoch: u64,
    control: Arc<MediaControl>,
    tx: UnboundedSender<PlaybackEvent>,
}

impl MediaHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_attached(&self) -> bool {
        self.control.attached.load(Ordering::SeqCst)
    }

    /// Whether the renderer should hold the media paused.
    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::SeqCst)
    }

    /// Report the media position. Returns false if the report was dropped.
    pub fn time_update(&self, position_secs: f64, duration_secs: f64) -> bool {
        self.report(SourceEvent::TimeUpdate {
            position_secs,
            duration_secs,
        })
    }

    /// Report that the media finished. Returns false if the report was dropped.
    pub fn ended(&self) -> bool {
        self.report(SourceEvent::Ended)
    }

    fn report(&self, event: SourceEvent) -> bool {
        if !self.is_attached() {
            return false;
        }
        self.tx
            .send(PlaybackEvent {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_until_teardown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ImageTimer::start(7, Duration::from_millis(50), tx);
        assert_eq!(timer.epoch(), 7);

        let first = rx.recv().await.unwrap();
        assert_eq!(first, PlaybackEvent { epoch: 7, event: SourceEvent::Tick });

        timer.teardown();
        assert!(!timer.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        // torn down timers never come back
        timer.resume();
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_timer_emits_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ImageTimer::start(1, Duration::from_millis(50), tx);
        timer.pause();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        timer.resume();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_detached_media_handle_refuses_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sub = VideoSubscription::attach(3, tx);
        let handle = sub.media_handle().unwrap();
        assert_eq!(sub.epoch(), handle.epoch());

        assert!(handle.time_update(1.0, 4.0));
        sub.teardown();
        assert!(!handle.ended());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.epoch, 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_video_pause_is_visible_to_renderer() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sub = VideoSubscription::attach(1, tx);
        let handle = sub.media_handle().unwrap();

        sub.pause();
        assert!(handle.is_paused());
        sub.resume();
        assert!(!handle.is_paused());
    }
}
