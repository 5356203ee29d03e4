//! Media classification for story playback.
//!
//! Before upload the local file's MIME type is authoritative. After upload only
//! the storage URL is known and object storage does not reliably keep the
//! content type, so the URL's file extension decides.

use crate::models::MediaKind;

/// Extensions played through the video path. Anything else renders as an image.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v", "avi", "mkv", "ogv", "3gp"];

/// Reference to story media at the point it is classified.
#[derive(Debug, Clone, Copy)]
pub enum MediaRef<'a> {
    /// Local file picked for upload, with its reported MIME type
    File { mime: &'a str },
    /// Uploaded media, addressed by its absolute URL
    Url(&'a str),
}

pub fn classify(media: MediaRef<'_>) -> MediaKind {
    match media {
        MediaRef::File { mime } => classify_mime(mime),
        MediaRef::Url(url) => classify_url(url),
    }
}

/// `video/*` is a video; unparsable or any other type is an image.
pub fn classify_mime(raw: &str) -> MediaKind {
    match raw.trim().parse::<mime::Mime>() {
        Ok(parsed) if parsed.type_() == mime::VIDEO => MediaKind::Video,
        _ => MediaKind::Image,
    }
}

pub fn classify_url(url: &str) -> MediaKind {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();

    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                MediaKind::Video
            } else {
                MediaKind::Image
            }
        }
        _ => MediaKind::Image,
    }
}
