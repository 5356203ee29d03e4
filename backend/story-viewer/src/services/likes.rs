//! Optimistic like/unlike for stories.
//!
//! State is keyed by story id. A response that lands after the viewer moved
//! on updates the story it belongs to, or nothing if that story was evicted.
//! Only one toggle per story may be in flight; overlapping toggles are refused
//! without touching state. Every toggle bumps a per-story write generation, and
//! a focus fetch that raced a toggle is discarded instead of stored.

use crate::config::LikesConfig;
use crate::db::{LikeStore, ViewerIdentity};
use crate::error::{Result, ViewerError};
use crate::metrics;
use crate::models::LikeState;
use crate::services::tentative::{apply_tentatively, RolledBack};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct LikeReconciler {
    store: Arc<dyn LikeStore>,
    identity: Arc<dyn ViewerIdentity>,
    states: DashMap<Uuid, LikeState>,
    in_flight: DashSet<Uuid>,
    // never evicted: a pending focus compares against the value it saw
    generations: DashMap<Uuid, u64>,
    remote_timeout: Duration,
}

/// Clears the in-flight mark when the toggle finishes or is dropped.
struct InFlightGuard<'a> {
    set: &'a DashSet<Uuid>,
    story_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.story_id);
    }
}

impl LikeReconciler {
    pub fn new(
        store: Arc<dyn LikeStore>,
        identity: Arc<dyn ViewerIdentity>,
        config: &LikesConfig,
    ) -> Self {
        Self {
            store,
            identity,
            states: DashMap::new(),
            in_flight: DashSet::new(),
            generations: DashMap::new(),
            remote_timeout: config.remote_timeout(),
        }
    }

    /// Local copy of a story's like state, if loaded.
    pub fn state(&self, story_id: Uuid) -> Option<LikeState> {
        self.states.get(&story_id).map(|entry| *entry)
    }

    pub fn is_in_flight(&self, story_id: Uuid) -> bool {
        self.in_flight.contains(&story_id)
    }

    /// Number of stories with a local like state.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    fn generation(&self, story_id: Uuid) -> u64 {
        self.generations.get(&story_id).map_or(0, |g| *g)
    }

    /// Load the like state of the story that just became visible.
    ///
    /// Entries for other stories are evicted unless a toggle on them is still
    /// in flight. An in-flight story keeps its optimistic value instead of
    /// being refetched. If a toggle on the story started while the fetch was
    /// pending, the fetched value is older than the local one and is dropped.
    /// Anonymous viewers see the count with `is_liked` false.
    pub async fn focus(&self, story_id: Uuid) -> Result<LikeState> {
        self.states
            .retain(|id, _| *id == story_id || self.in_flight.contains(id));

        if self.is_in_flight(story_id) {
            if let Some(state) = self.state(story_id) {
                return Ok(state);
            }
        }

        let viewer_id = self.identity.current_viewer_id().unwrap_or(Uuid::nil());
        let generation = self.generation(story_id);
        let fetched = self.fetch(story_id, viewer_id).await?;

        // a toggle started while we were fetching owns the value now
        if self.is_in_flight(story_id) || self.generation(story_id) != generation {
            debug!(story_id = %story_id, "stale like state fetch discarded");
            return Ok(self.state(story_id).unwrap_or(fetched));
        }
        self.states.insert(story_id, fetched);
        debug!(
            story_id = %story_id,
            liked = fetched.is_liked(),
            count = fetched.count(),
            "like state focused"
        );
        Ok(fetched)
    }

    /// Flip the viewer's like on `story_id`.
    ///
    /// The local state changes before the remote write is awaited. On failure
    /// the exact prior state is restored and the error is returned once; there
    /// is no automatic retry.
    pub async fn toggle(&self, story_id: Uuid) -> Result<LikeState> {
        let viewer_id = match self.identity.current_viewer_id() {
            Some(id) => id,
            None => {
                metrics::record_like_toggle("rejected");
                return Err(ViewerError::Unauthenticated);
            }
        };

        if !self.in_flight.insert(story_id) {
            metrics::record_like_toggle("ignored");
            debug!(story_id = %story_id, "like toggle ignored, previous toggle in flight");
            return Err(ViewerError::ToggleInFlight(story_id));
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            story_id,
        };
        *self.generations.entry(story_id).or_insert(0) += 1;

        let prior = match self.state(story_id) {
            Some(state) => state,
            None => {
                let fetched = self.fetch(story_id, viewer_id).await?;
                self.states.insert(story_id, fetched);
                fetched
            }
        };
        let optimistic = prior.toggled();

        let slot = |value: LikeState| match self.states.get_mut(&story_id) {
            Some(mut entry) => {
                *entry = value;
                true
            }
            None => false,
        };

        let remote = async {
            let call = if optimistic.is_liked() {
                self.store.insert_like(story_id, viewer_id)
            } else {
                self.store.delete_like(story_id, viewer_id)
            };
            match tokio::time::timeout(self.remote_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ViewerError::Timeout(self.remote_timeout)),
            }
        };

        match apply_tentatively(&slot, prior, optimistic, remote).await {
            Ok(state) => {
                metrics::record_like_toggle("applied");
                info!(
                    story_id = %story_id,
                    liked = state.is_liked(),
                    count = state.count(),
                    "story like saved"
                );
                Ok(state)
            }
            Err(RolledBack { error, restored }) => {
                metrics::record_like_toggle("rolled_back");
                warn!(
                    story_id = %story_id,
                    restored,
                    error = %error,
                    "story like failed, local state rolled back"
                );
                Err(match error {
                    ViewerError::Timeout(after) => ViewerError::Timeout(after),
                    other => ViewerError::RemoteWrite(other.to_string()),
                })
            }
        }
    }

    async fn fetch(&self, story_id: Uuid, viewer_id: Uuid) -> Result<LikeState> {
        match tokio::time::timeout(
            self.remote_timeout,
            self.store.fetch_like_state(story_id, viewer_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ViewerError::Timeout(self.remote_timeout)),
        }
    }
}
