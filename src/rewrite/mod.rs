//! Applies `source URL → local asset` mappings to a content document.
//!
//! All mappings of a run are applied in one pass over the original
//! document. Matches are collected first, overlapping matches are resolved
//! (earliest start, then longest, then mapping order), and the output is
//! assembled once. Replacement text is never rescanned, so applying the
//! same mappings twice gives the same document as applying them once.
//!
//! A match must end at a URL boundary: `https://x.example/a.jpg` does not
//! match inside `https://x.example/a.jpg2` or `.../a.jpg?w=300`.

mod variants;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

pub use variants::{SizeSuffixRule, VariantRule};

use crate::store::Asset;
use variants::textual_variants;

/// A source URL and the asset that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMapping {
    pub source_url: String,
    pub asset: Asset,
}

impl UrlMapping {
    pub fn new(source_url: impl Into<String>, asset: Asset) -> Self {
        Self {
            source_url: source_url.into(),
            asset,
        }
    }
}

/// Outcome of one rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteResult {
    /// The rewritten document.
    pub document: String,
    /// Occurrences of source URLs (literal or textual variants) replaced.
    pub substitutions: usize,
    /// Occurrences replaced by [`VariantRule`]s.
    pub variant_substitutions: usize,
    /// Source URLs with no occurrence in the document.
    pub misses: Vec<String>,
}

/// Characters that may continue a URL; a match followed by one of these is
/// a prefix of a longer URL and is left alone.
fn continues_url(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~/?#%&=+@".contains(c)
}

struct Candidate<'a> {
    start: usize,
    end: usize,
    replacement: &'a str,
    mapping: usize,
    from_rule: bool,
}

/// Rewrites documents using textual variants plus a set of [`VariantRule`]s.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    rules: Vec<Arc<dyn VariantRule>>,
}

impl Default for ContentRewriter {
    fn default() -> Self {
        Self::with_rules(vec![Arc::new(SizeSuffixRule)])
    }
}

impl ContentRewriter {
    /// Rewriter with the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewriter with an explicit rule set (may be empty).
    #[must_use]
    pub fn with_rules(rules: Vec<Arc<dyn VariantRule>>) -> Self {
        Self { rules }
    }

    /// Applies every mapping to `document` in a single pass.
    ///
    /// Mappings are deduplicated by source URL (first wins). Sources that are
    /// not found are logged and reported in [`RewriteResult::misses`].
    #[instrument(skip_all, fields(mappings = mappings.len(), len = document.len()))]
    pub fn rewrite(&self, document: &str, mappings: &[UrlMapping]) -> RewriteResult {
        let mappings = normalize_mappings(mappings);

        let mut patterns: Vec<(String, String, usize, bool)> = Vec::new();
        for (index, mapping) in mappings.iter().enumerate() {
            let local = mapping.asset.local_url.as_str();
            patterns.push((mapping.source_url.clone(), local.to_string(), index, false));
            for variant in textual_variants(&mapping.source_url) {
                patterns.push((variant, local.to_string(), index, false));
            }
            for rule in &self.rules {
                for (found, replacement) in rule.variants(mapping, document) {
                    patterns.push((found, replacement, index, true));
                }
            }
        }

        let mut candidates = Vec::new();
        for (pattern, replacement, mapping, from_rule) in &patterns {
            if pattern.is_empty() {
                continue;
            }
            for (start, _) in document.match_indices(pattern.as_str()) {
                let end = start + pattern.len();
                if is_bounded(document, start, end, pattern) {
                    candidates.push(Candidate {
                        start,
                        end,
                        replacement,
                        mapping: *mapping,
                        from_rule: *from_rule,
                    });
                }
            }
        }
        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then((b.end - b.start).cmp(&(a.end - a.start)))
                .then(a.mapping.cmp(&b.mapping))
        });

        let mut output = String::with_capacity(document.len());
        let mut cursor = 0;
        let mut hits = vec![0usize; mappings.len()];
        let mut substitutions = 0;
        let mut variant_substitutions = 0;
        for candidate in candidates {
            if candidate.start < cursor {
                continue;
            }
            output.push_str(&document[cursor..candidate.start]);
            output.push_str(candidate.replacement);
            cursor = candidate.end;
            if candidate.from_rule {
                variant_substitutions += 1;
            } else {
                hits[candidate.mapping] += 1;
                substitutions += 1;
            }
        }
        output.push_str(&document[cursor..]);

        let misses: Vec<String> = mappings
            .iter()
            .zip(&hits)
            .filter(|(_, count)| **count == 0)
            .map(|(mapping, _)| mapping.source_url.clone())
            .collect();
        for miss in &misses {
            warn!(source_url = %miss, "rewrite miss: source URL not found in document");
        }
        debug!(substitutions, variant_substitutions, misses = misses.len(), "rewrite complete");

        RewriteResult {
            document: output,
            substitutions,
            variant_substitutions,
            misses,
        }
    }
}

/// Deduplicates by source URL (first wins) and orders longest source first.
fn normalize_mappings(mappings: &[UrlMapping]) -> Vec<&UrlMapping> {
    let mut seen = HashSet::new();
    let mut unique: Vec<&UrlMapping> = mappings
        .iter()
        .filter(|m| !m.source_url.is_empty() && seen.insert(m.source_url.as_str()))
        .collect();
    unique.sort_by(|a, b| {
        b.source_url
            .len()
            .cmp(&a.source_url.len())
            .then_with(|| a.source_url.cmp(&b.source_url))
    });
    unique
}

/// Rejects matches that are the tail or head of a longer URL.
fn is_bounded(document: &str, start: usize, end: usize, pattern: &str) -> bool {
    if document[end..].chars().next().is_some_and(continues_url) {
        return false;
    }
    let Some(before) = document[..start].chars().next_back() else {
        return true;
    };
    if pattern.starts_with("//") {
        // `//host/x` inside `https://host/x` is part of the absolute URL.
        !(before == ':' || before == '/' || before.is_ascii_alphanumeric())
    } else {
        !before.is_ascii_alphanumeric()
    }
}
