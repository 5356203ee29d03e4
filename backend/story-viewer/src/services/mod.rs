pub mod likes;
pub mod media;
pub mod playback;
pub mod session;
pub mod tentative;

pub use likes::LikeReconciler;
pub use media::{classify, classify_mime, classify_url, MediaRef};
pub use playback::{PlaybackController, PlaybackSnapshot, PlaybackState, PlaybackUpdate};
pub use session::StorySession;
