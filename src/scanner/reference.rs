//! Media reference types produced by the scanner.

use std::fmt;

use serde::{Deserialize, Serialize};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "png", "gif", "webp", "avif", "bmp", "svg", "ico", "tif", "tiff",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "mov", "ogv", "mkv", "avi"];

/// Kind of media a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image (`<img>`, `poster=`, `<source type="image/...">`).
    Image,
    /// Video (`<video>`, `<source>` inside a video).
    Video,
}

impl MediaKind {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Guesses the kind from a URL's file extension.
    #[must_use]
    pub fn from_extension(url: &str) -> Option<Self> {
        let ext = url_extension(url)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media reference discovered in a content document.
///
/// The same URL may appear in several references; each occurrence is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// URL as written in the document, with HTML entities decoded.
    pub source_url: String,
    /// Image or video.
    pub kind: MediaKind,
    /// `alt` attribute of the carrying tag.
    pub alt_text: Option<String>,
    /// `title` attribute of the carrying tag.
    pub title: Option<String>,
    /// Ordinal of the carrying element among the document's media elements.
    pub position_hint: usize,
}

impl MediaReference {
    /// Creates a reference with no alt text or title.
    pub fn new(source_url: impl Into<String>, kind: MediaKind, position_hint: usize) -> Self {
        Self {
            source_url: source_url.into(),
            kind,
            alt_text: None,
            title: None,
            position_hint,
        }
    }

    /// Creates an image reference at offset 0, handy for callers that
    /// dispatch single URLs.
    pub fn image(source_url: impl Into<String>) -> Self {
        Self::new(source_url, MediaKind::Image, 0)
    }
}

/// Lowercased extension of the last path segment, ignoring query and fragment.
pub(crate) fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next()?;
    let dot = last_segment.rfind('.')?;
    let ext = &last_segment[dot + 1..];
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
