//! Content-type detection from leading bytes.
//!
//! Servers mislabel media often enough that the `Content-Type` header is
//! ignored; the type is decided from magic numbers instead.

use image::ImageFormat;

/// Returns the MIME type of `bytes`, or `None` when no signature matches.
///
/// Video containers and AVIF are recognised from their ISO/EBML headers;
/// raster images go through [`image::guess_format`].
#[must_use]
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if let Some(brand) = iso_brand(bytes) {
        return Some(match brand {
            b"avif" | b"avis" => "image/avif",
            b"qt  " => "video/quicktime",
            _ => "video/mp4",
        });
    }
    if let Some(mime) = image::guess_format(bytes).ok().and_then(format_to_mime) {
        return Some(mime);
    }
    if looks_like_svg(bytes) {
        return Some("image/svg+xml");
    }
    None
}

/// MIME type for the raster formats the pipeline stores.
fn format_to_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Avif => Some("image/avif"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Ico => Some("image/x-icon"),
        _ => None,
    }
}

/// Major brand of an ISO base media file (`....ftypBRND`).
fn iso_brand(bytes: &[u8]) -> Option<&[u8; 4]> {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    bytes[8..12].try_into().ok()
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(super::constants::SNIFF_LEN)];
    let Ok(text) = std::str::from_utf8(head).or_else(|e| std::str::from_utf8(&head[..e.valid_up_to()])) else {
        return false;
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    (text.starts_with("<?xml") || text.starts_with("<svg") || text.starts_with("<!--"))
        && text.contains("<svg")
}

/// File extension (without dot) for a MIME type produced by [`sniff_mime`].
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/avif" => "avif",
        "image/tiff" => "tif",
        "image/x-icon" => "ico",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_common_images() {
        assert_eq!(sniff_mime(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"), Some("image/jpeg"));
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n\x00\x00"), Some("image/png"));
        assert_eq!(sniff_mime(b"GIF89a\x01\x00"), Some("image/gif"));
        assert_eq!(sniff_mime(b"RIFF\x24\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_mime(b"BM\x36\x00\x00\x00\x00\x00\x00\x00\x36\x00\x00\x00"), Some("image/bmp"));
    }

    #[test]
    fn test_sniff_tiff_and_ico() {
        assert_eq!(sniff_mime(b"II*\x00\x08\x00\x00\x00"), Some("image/tiff"));
        assert_eq!(sniff_mime(b"\x00\x00\x01\x00\x01\x00\x10\x10"), Some("image/x-icon"));
    }

    #[test]
    fn test_format_to_mime_skips_unstored_formats() {
        assert_eq!(format_to_mime(ImageFormat::Png), Some("image/png"));
        assert_eq!(format_to_mime(ImageFormat::Hdr), None);
        assert_eq!(format_to_mime(ImageFormat::Qoi), None);
    }

    #[test]
    fn test_sniff_iso_media_brands() {
        assert_eq!(sniff_mime(b"\x00\x00\x00\x1cftypavif\x00\x00\x00\x00"), Some("image/avif"));
        assert_eq!(sniff_mime(b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00"), Some("video/mp4"));
        assert_eq!(sniff_mime(b"\x00\x00\x00\x14ftypqt  \x00\x00\x00\x00"), Some("video/quicktime"));
        assert_eq!(sniff_mime(b"\x1A\x45\xDF\xA3\x9f\x42\x86\x81"), Some("video/webm"));
    }

    #[test]
    fn test_sniff_svg() {
        assert_eq!(
            sniff_mime(br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"/>"#),
            Some("image/svg+xml")
        );
        assert_eq!(sniff_mime(b"  <svg width=\"1\"></svg>"), Some("image/svg+xml"));
    }

    #[test]
    fn test_sniff_ignores_html_and_text() {
        assert_eq!(sniff_mime(b"<!DOCTYPE html><html><body>login</body></html>"), None);
        assert_eq!(sniff_mime(b"plain text"), None);
        assert_eq!(sniff_mime(b""), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("video/quicktime"), "mov");
        assert_eq!(extension_for_mime("application/pdf"), "bin");
    }
}
