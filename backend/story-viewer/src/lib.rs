/// Story Viewer Library
///
/// Plays a viewer's active stories (24-hour window) one owner at a time and
/// keeps story likes in sync with the backend optimistically.
///
/// # Modules
///
/// - `models`: Stories, per-owner sequences, like state, playback cursor
/// - `services`: Media classification, like reconciliation, playback control, sessions
/// - `db`: Backend traits and the Postgres implementation
/// - `error`: Error types and user-facing notices
/// - `config`: Configuration management
/// - `metrics`: Prometheus collectors
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;

pub use error::{Result, ViewerError};
