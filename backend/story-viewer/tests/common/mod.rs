#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use story_viewer::db::{LikeStore, StoryDataSource};
use story_viewer::models::{LikeState, Story, StorySequence};
use story_viewer::{Result, ViewerError};
use tokio::sync::Notify;
use uuid::Uuid;

/// Build a sequence for a fresh owner from media URLs, oldest first.
pub fn sequence(name: &str, urls: &[&str]) -> StorySequence {
    let owner = Uuid::new_v4();
    let base = Utc::now() - Duration::hours(1);
    let stories = urls
        .iter()
        .enumerate()
        .map(|(i, url)| Story {
            id: Uuid::new_v4(),
            owner_id: owner,
            media_url: url.to_string(),
            created_at: base + Duration::minutes(i as i64),
        })
        .collect();
    StorySequence::new(owner, name, None, stories).expect("non-empty sequence")
}

pub fn images(name: &str, count: usize) -> StorySequence {
    let urls: Vec<String> = (0..count)
        .map(|i| format!("https://storage.example.com/stories/{}/{}.jpg", name, i))
        .collect();
    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    sequence(name, &refs)
}

/// In-memory backend with switchable write failures, an optional gate that
/// holds writes until released, and a one-shot gate for the next fetch.
#[derive(Default)]
pub struct InMemoryBackend {
    pub sequences: Mutex<Vec<StorySequence>>,
    likes: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    pub views: Mutex<Vec<(Uuid, Uuid)>>,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    pub fetches: AtomicUsize,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
}

impl InMemoryBackend {
    pub fn with_sequences(sequences: Vec<StorySequence>) -> Arc<Self> {
        let backend = Self::default();
        *backend.sequences.lock().unwrap() = sequences;
        Arc::new(backend)
    }

    /// Seed `count` likes from other accounts, plus the viewer's own if `viewer` is set.
    pub fn seed_likes(&self, story_id: Uuid, count: usize, viewer: Option<Uuid>) {
        let mut likes = self.likes.lock().unwrap();
        let entry = likes.entry(story_id).or_default();
        for _ in 0..count {
            entry.insert(Uuid::new_v4());
        }
        if let Some(viewer) = viewer {
            entry.insert(viewer);
        }
    }

    /// Hold every subsequent write until the returned notify is signalled.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold the response of the next fetch until the returned notify is
    /// signalled. The response is the remote state at the time of the call.
    pub fn hold_next_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn remote_state(&self, story_id: Uuid, viewer_id: Uuid) -> LikeState {
        let likes = self.likes.lock().unwrap();
        match likes.get(&story_id) {
            Some(set) => LikeState::new(set.contains(&viewer_id), set.len() as i64),
            None => LikeState::default(),
        }
    }

    async fn before_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ViewerError::RemoteWrite("row-level security denied write".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoryDataSource for InMemoryBackend {
    async fn list_active_story_sequences(
        &self,
        _viewer_id: Uuid,
        _window_hours: i32,
    ) -> Result<Vec<StorySequence>> {
        Ok(self.sequences.lock().unwrap().clone())
    }

    async fn record_view(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()> {
        self.views.lock().unwrap().push((story_id, viewer_id));
        Ok(())
    }
}

#[async_trait::async_trait]
impl LikeStore for InMemoryBackend {
    async fn fetch_like_state(&self, story_id: Uuid, viewer_id: Uuid) -> Result<LikeState> {
        let snapshot = self.remote_state(story_id, viewer_id);
        let gate = self.fetch_gate.lock().unwrap().take();
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(snapshot)
    }

    async fn insert_like(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()> {
        self.before_write().await?;
        self.likes
            .lock()
            .unwrap()
            .entry(story_id)
            .or_default()
            .insert(viewer_id);
        Ok(())
    }

    async fn delete_like(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()> {
        self.before_write().await?;
        if let Some(set) = self.likes.lock().unwrap().get_mut(&story_id) {
            set.remove(&viewer_id);
        }
        Ok(())
    }
}
