//! Discovery of media references in content documents.
//!
//! [`scan`] walks `<img>`, `<video>` and `<source>` tags and yields one
//! [`MediaReference`] per media URL they carry:
//!
//! | Tag        | Attributes                   | Kind                          |
//! |------------|------------------------------|-------------------------------|
//! | `<img>`    | `src`, `data-src`, `srcset`  | image                         |
//! | `<video>`  | `src`                        | video                         |
//! | `<video>`  | `poster`                     | image                         |
//! | `<source>` | `src`, `srcset`              | from `type=`, then extension  |
//!
//! Scanning is lazy and never fails: the document is parsed with `scraper`
//! on the first call to `next`, so unterminated tags and stray markup are
//! recovered the way a browser would. References are not deduplicated
//! because every occurrence may need rewriting.
//!
//! ```
//! use media_ingest_core::scanner::{MediaKind, scan};
//!
//! let refs: Vec<_> = scan(r#"<p><img src="https://ext.example/a.jpg" alt="A"></p>"#).collect();
//! assert_eq!(refs.len(), 1);
//! assert_eq!(refs[0].kind, MediaKind::Image);
//! assert_eq!(refs[0].alt_text.as_deref(), Some("A"));
//! ```

pub mod markup;
mod reference;

use std::collections::VecDeque;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::trace;

pub use reference::{MediaKind, MediaReference};
pub(crate) use reference::url_extension;

#[allow(clippy::expect_used)]
static MEDIA_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img, video, source").expect("media selector is valid") // Static pattern, safe to panic
});

/// Returns a lazy iterator over the media references in `document`.
///
/// Calling `scan` again on the same document restarts from the beginning and
/// yields the same sequence.
#[must_use]
pub fn scan(document: &str) -> References<'_> {
    References {
        document,
        pending: None,
    }
}

/// Iterator returned by [`scan`].
pub struct References<'a> {
    document: &'a str,
    pending: Option<VecDeque<MediaReference>>,
}

impl Iterator for References<'_> {
    type Item = MediaReference;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.document;
        self.pending
            .get_or_insert_with(|| collect_references(document))
            .pop_front()
    }
}

/// Parses `document` and walks its media elements in document order.
///
/// The parsed tree is dropped before returning so the iterator stays `Send`.
fn collect_references(document: &str) -> VecDeque<MediaReference> {
    let html = Html::parse_fragment(document);
    let mut out = VecDeque::new();
    for (ordinal, element) in html.select(&MEDIA_SELECTOR).enumerate() {
        trace!(tag = element.value().name(), ordinal, "scanning tag");
        MediaElement(element).collect_references(ordinal, &mut out);
    }
    out
}

/// One `<img>`, `<video>` or `<source>` element.
struct MediaElement<'a>(ElementRef<'a>);

impl MediaElement<'_> {
    /// Attribute value with entities decoded, trimmed, empty treated as absent.
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .value()
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn collect_references(&self, ordinal: usize, out: &mut VecDeque<MediaReference>) {
        let alt = self.get("alt").map(str::to_string);
        let title = self.get("title").map(str::to_string);
        let mut push = |url: &str, kind: MediaKind| {
            out.push_back(MediaReference {
                source_url: url.to_string(),
                kind,
                alt_text: alt.clone(),
                title: title.clone(),
                position_hint: ordinal,
            });
        };

        match self.0.value().name() {
            "img" => {
                let src = self.get("src");
                if let Some(src) = src {
                    push(src, MediaKind::Image);
                }
                if let Some(lazy) = self.get("data-src").filter(|lazy| Some(*lazy) != src) {
                    push(lazy, MediaKind::Image);
                }
                for candidate in self.get("srcset").map(srcset_urls).unwrap_or_default() {
                    if Some(candidate) != src {
                        push(candidate, MediaKind::Image);
                    }
                }
            }
            "video" => {
                if let Some(src) = self.get("src") {
                    push(src, MediaKind::Video);
                }
                if let Some(poster) = self.get("poster") {
                    push(poster, MediaKind::Image);
                }
            }
            "source" => {
                let declared = self.get("type").map(|t| {
                    if t.to_ascii_lowercase().starts_with("image/") {
                        MediaKind::Image
                    } else {
                        MediaKind::Video
                    }
                });
                if let Some(src) = self.get("src") {
                    let kind = declared
                        .or_else(|| MediaKind::from_extension(src))
                        .unwrap_or(MediaKind::Video);
                    push(src, kind);
                }
                for candidate in self.get("srcset").map(srcset_urls).unwrap_or_default() {
                    push(candidate, declared.unwrap_or(MediaKind::Image));
                }
            }
            _ => {}
        }
    }
}

/// Splits a `srcset` value into its candidate URLs.
fn srcset_urls(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
        .collect()
}
