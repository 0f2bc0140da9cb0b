//! Filename derivation and sanitization for stored media.

use std::path::{Component, Path};

use tracing::debug;
use url::Url;

use super::sniff::extension_for_mime;

/// Longest stem kept from a URL, in characters.
const MAX_STEM_CHARS: usize = 120;

/// Sanitizes a filename for safe filesystem storage.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Builds the stored filename for media fetched from `url`.
///
/// The stem comes from the last URL path segment (percent-decoded, original
/// extension dropped); the extension always comes from the sniffed MIME type.
/// URLs without a usable segment fall back to `media-<timestamp>`.
pub(crate) fn filename_for(url: &Url, mime: &str) -> String {
    let extension = extension_for_mime(mime);
    let stem = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty())
        .map(|last| {
            let decoded = urlencoding::decode(last).map_or_else(
                |e| {
                    debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
                    last.to_string()
                },
                std::borrow::Cow::into_owned,
            );
            let stem = match decoded.rfind('.') {
                Some(pos) if pos > 0 => decoded[..pos].to_string(),
                _ => decoded,
            };
            sanitize_filename(&stem).chars().take(MAX_STEM_CHARS).collect::<String>()
        })
        .filter(|stem| !stem.trim_matches('_').is_empty());

    let stem = stem.unwrap_or_else(|| {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("media-{timestamp}")
    });
    format!("{stem}.{extension}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file\\name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file:name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file<name>.jpg"), "file_name_.jpg");
        assert_eq!(sanitize_filename("file|name.jpg"), "file_name.jpg");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("valid-file_name.jpg"), "valid-file_name.jpg");
        assert_eq!(sanitize_filename("日本語.png"), "日本語.png");
    }

    #[test]
    fn test_filename_for_uses_sniffed_extension() {
        let url = Url::parse("https://ext.example/photos/sunset.png?w=800").unwrap();
        assert_eq!(filename_for(&url, "image/jpeg"), "sunset.jpg");
    }

    #[test]
    fn test_filename_for_decodes_percent_escapes() {
        let url = Url::parse("https://ext.example/my%20photo.jpg").unwrap();
        assert_eq!(filename_for(&url, "image/jpeg"), "my photo.jpg");
    }

    #[test]
    fn test_filename_for_without_segment_uses_fallback() {
        let url = Url::parse("https://ext.example/").unwrap();
        let name = filename_for(&url, "image/png");
        assert!(name.starts_with("media-"), "got {name}");
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_filename_for_keeps_extensionless_stem() {
        let url = Url::parse("https://ext.example/image/12345").unwrap();
        assert_eq!(filename_for(&url, "image/webp"), "12345.webp");
    }
}
