//! Prometheus collectors for story playback and like reconciliation.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Playback transitions segmented by kind (advance, retreat, select, close).
    pub static ref STORY_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "story_transitions_total",
        "Story playback transitions segmented by kind",
        &["kind"]
    )
    .expect("failed to register story_transitions_total");

    /// Like toggles segmented by outcome (applied, rolled_back, rejected, ignored).
    pub static ref STORY_LIKE_TOGGLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "story_like_toggles_total",
        "Story like toggles segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register story_like_toggles_total");
}

pub fn record_transition(kind: &str) {
    STORY_TRANSITIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_like_toggle(outcome: &str) {
    STORY_LIKE_TOGGLES_TOTAL.with_label_values(&[outcome]).inc();
}
