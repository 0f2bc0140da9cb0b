//! Alternative spellings of a source URL inside markup.

use std::fmt;

use regex::Regex;
use tracing::debug;

use super::UrlMapping;
use crate::scanner::markup::encoded_url_forms;

/// Textual spellings of `source_url` other than the literal one:
/// entity-encoded `&`, percent-decoded, and protocol-relative.
pub(crate) fn textual_variants(source_url: &str) -> Vec<String> {
    let mut variants = encoded_url_forms(source_url);

    if let Ok(decoded) = urlencoding::decode(source_url)
        && decoded != source_url
    {
        variants.extend(encoded_url_forms(&decoded));
        variants.push(decoded.into_owned());
    }

    if let Some(rest) = source_url
        .strip_prefix("https:")
        .or_else(|| source_url.strip_prefix("http:"))
        && rest.starts_with("//")
    {
        variants.push(rest.to_string());
    } else if source_url.starts_with("//") {
        variants.push(format!("https:{source_url}"));
        variants.push(format!("http:{source_url}"));
    }

    variants.retain(|v| v != source_url);
    variants.sort();
    variants.dedup();
    variants
}

/// Finds derived URLs of a mapping that should be rewritten along with it.
///
/// Returned pairs are `(text found in the document, replacement)`.
pub trait VariantRule: Send + Sync + fmt::Debug {
    fn variants(&self, mapping: &UrlMapping, document: &str) -> Vec<(String, String)>;
}

/// Remaps generated-size siblings such as `photo-300x200.png` when the stored
/// asset changed extension, e.g. `dir/photo-300x200.png` becomes
/// `localdir/photo-300x200.jpg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeSuffixRule;

/// `(directory, stem, extension)` of a URL without query or fragment.
fn split_url_file(url: &str) -> Option<(&str, &str, &str)> {
    if url.contains(['?', '#']) {
        return None;
    }
    let (dir, file) = url.rsplit_once('/')?;
    let (stem, ext) = file.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some((dir, stem, ext))
}

impl VariantRule for SizeSuffixRule {
    fn variants(&self, mapping: &UrlMapping, document: &str) -> Vec<(String, String)> {
        let Some((src_dir, src_stem, src_ext)) = split_url_file(&mapping.source_url) else {
            return Vec::new();
        };
        let Some((local_dir, local_stem, local_ext)) = split_url_file(&mapping.asset.local_url)
        else {
            return Vec::new();
        };
        if src_ext.eq_ignore_ascii_case(local_ext) {
            return Vec::new();
        }

        let pattern = format!(
            r"{}/{}-(\d{{1,5}})x(\d{{1,5}})\.{}",
            regex::escape(src_dir),
            regex::escape(src_stem),
            regex::escape(src_ext)
        );
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                debug!(error = %e, "size-suffix pattern rejected");
                return Vec::new();
            }
        };

        let mut pairs: Vec<(String, String)> = re
            .captures_iter(document)
            .filter_map(|caps| {
                let found = caps.get(0)?.as_str().to_string();
                let replacement =
                    format!("{local_dir}/{local_stem}-{}x{}.{local_ext}", &caps[1], &caps[2]);
                Some((found, replacement))
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Asset;

    fn mapping(source: &str, local: &str) -> UrlMapping {
        UrlMapping::new(
            source,
            Asset {
                id: 1,
                local_url: local.to_string(),
                relative_path: String::new(),
                filename: String::new(),
                mime_type: "image/jpeg".to_string(),
                size_bytes: 0,
                alt_text: None,
                title: None,
                source_url: None,
            },
        )
    }

    #[test]
    fn test_textual_variants_cover_encodings_and_protocol() {
        let variants = textual_variants("https://ext.example/a%20b.jpg?w=1&h=2");
        assert!(variants.contains(&"https://ext.example/a%20b.jpg?w=1&amp;h=2".to_string()));
        assert!(variants.contains(&"https://ext.example/a%20b.jpg?w=1&#038;h=2".to_string()));
        assert!(variants.contains(&"https://ext.example/a b.jpg?w=1&h=2".to_string()));
        assert!(variants.contains(&"//ext.example/a%20b.jpg?w=1&h=2".to_string()));
    }

    #[test]
    fn test_textual_variants_of_protocol_relative_source() {
        let variants = textual_variants("//ext.example/a.jpg");
        assert!(variants.contains(&"https://ext.example/a.jpg".to_string()));
        assert!(variants.contains(&"http://ext.example/a.jpg".to_string()));
    }

    #[test]
    fn test_size_suffix_rule_remaps_siblings_when_extension_changes() {
        let doc = r#"<img src="https://ext.example/up/photo.png" srcset="https://ext.example/up/photo-300x200.png 300w, https://ext.example/up/photo-1024x683.png 1024w">"#;
        let m = mapping(
            "https://ext.example/up/photo.png",
            "https://blog.example.org/media/2026/03/photo.jpg",
        );

        let pairs = SizeSuffixRule.variants(&m, doc);

        assert_eq!(
            pairs,
            vec![
                (
                    "https://ext.example/up/photo-1024x683.png".to_string(),
                    "https://blog.example.org/media/2026/03/photo-1024x683.jpg".to_string()
                ),
                (
                    "https://ext.example/up/photo-300x200.png".to_string(),
                    "https://blog.example.org/media/2026/03/photo-300x200.jpg".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_size_suffix_rule_ignores_same_extension() {
        let doc = "https://ext.example/up/photo-300x200.jpg";
        let m = mapping(
            "https://ext.example/up/photo.jpg",
            "https://blog.example.org/media/2026/03/photo.jpg",
        );
        assert!(SizeSuffixRule.variants(&m, doc).is_empty());
    }

    #[test]
    fn test_size_suffix_rule_skips_query_urls() {
        let m = mapping(
            "https://ext.example/up/photo.png?v=2",
            "https://blog.example.org/media/2026/03/photo.jpg",
        );
        assert!(SizeSuffixRule.variants(&m, "anything").is_empty());
    }
}
