//! Reference classification ahead of any network I/O.
//!
//! Rules apply in priority order; the first match decides:
//!
//! 1. [`ValidationOutcome::Malformed`] - relative URL, `data:` URI or a
//!    scheme other than http(s). `//host/path` counts as https.
//! 2. [`ValidationOutcome::AlreadyLocal`] - host and path prefix match a
//!    configured base URL (scheme is ignored).
//! 3. [`ValidationOutcome::ExcludedDomain`] - host matches an exclusion.
//! 4. [`ValidationOutcome::PreviouslyFailed`] - URL is in the ledger.
//! 5. [`ValidationOutcome::Eligible`].

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::IngestConfig;
use crate::ledger::{FailedUrlLedger, LedgerError};
use crate::scanner::MediaReference;

/// Classification of a single reference. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    AlreadyLocal,
    ExcludedDomain,
    Malformed,
    PreviouslyFailed,
    Eligible,
}

impl ValidationOutcome {
    /// Whether the reference is handed to the retry controller.
    ///
    /// `PreviouslyFailed` is dispatched so the controller can record it as
    /// skipped without any network attempt.
    #[must_use]
    pub fn is_dispatched(self) -> bool {
        matches!(self, Self::Eligible | Self::PreviouslyFailed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyLocal => "already_local",
            Self::ExcludedDomain => "excluded_domain",
            Self::Malformed => "malformed",
            Self::PreviouslyFailed => "previously_failed",
            Self::Eligible => "eligible",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a reference URL into the absolute http(s) URL that would be fetched.
///
/// Protocol-relative URLs get `https:`. Returns `None` for anything that is
/// not an absolute http(s) URL with a host.
#[must_use]
pub fn fetchable_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = if raw.starts_with("//") {
        Url::parse(&format!("https:{raw}")).ok()?
    } else {
        Url::parse(raw).ok()?
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().filter(|h| !h.is_empty())?;
    Some(parsed)
}

#[derive(Debug, Clone)]
struct BaseUrl {
    host: String,
    port: Option<u16>,
    path_prefix: String,
}

impl BaseUrl {
    fn parse(raw: &str) -> Option<Self> {
        let url = fetchable_url(raw)?;
        let path = url.path().trim_end_matches('/').to_string();
        Some(Self {
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port(),
            path_prefix: path,
        })
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if !host.eq_ignore_ascii_case(&self.host) || url.port() != self.port {
            return false;
        }
        if self.path_prefix.is_empty() {
            return true;
        }
        let path = url.path();
        path == self.path_prefix
            || path
                .strip_prefix(self.path_prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[derive(Debug, Clone)]
enum DomainPattern {
    /// `*.example.com`: the apex and any subdomain.
    Wildcard(String),
    /// `example.com`: that host only.
    Exact(String),
}

impl DomainPattern {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim().trim_end_matches('.').to_ascii_lowercase();
        match raw.strip_prefix("*.") {
            Some(apex) => Self::Wildcard(apex.to_string()),
            None => Self::Exact(raw),
        }
    }

    fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        match self {
            Self::Exact(exact) => host == *exact,
            Self::Wildcard(apex) => {
                host == *apex
                    || host
                        .strip_suffix(apex.as_str())
                        .is_some_and(|sub| sub.ends_with('.'))
            }
        }
    }
}

/// Applies the classification rules using an [`IngestConfig`].
#[derive(Debug, Clone)]
pub struct Classifier {
    base_urls: Vec<BaseUrl>,
    exclusions: Vec<DomainPattern>,
}

impl Classifier {
    /// Builds a classifier from the configured base URLs and exclusions.
    ///
    /// Base URLs that do not parse are skipped with a warning.
    #[must_use]
    pub fn new(config: &IngestConfig) -> Self {
        let base_urls = config
            .base_urls
            .iter()
            .filter_map(|raw| {
                let parsed = BaseUrl::parse(raw);
                if parsed.is_none() {
                    warn!(base_url = %raw, "ignoring unparseable base URL");
                }
                parsed
            })
            .collect();
        let exclusions = config
            .excluded_domains
            .iter()
            .map(|p| DomainPattern::parse(p))
            .collect();
        Self {
            base_urls,
            exclusions,
        }
    }

    /// Rules 1-3. Returns `None` when the reference still needs the ledger check.
    #[must_use]
    pub fn classify_static(&self, reference: &MediaReference) -> Option<ValidationOutcome> {
        let Some(url) = fetchable_url(&reference.source_url) else {
            return Some(ValidationOutcome::Malformed);
        };
        if self.base_urls.iter().any(|base| base.matches(&url)) {
            return Some(ValidationOutcome::AlreadyLocal);
        }
        let host = url.host_str().unwrap_or_default();
        if self.exclusions.iter().any(|p| p.matches(host)) {
            return Some(ValidationOutcome::ExcludedDomain);
        }
        None
    }

    /// Full classification including the ledger lookup.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the ledger cannot be queried.
    pub async fn classify(
        &self,
        reference: &MediaReference,
        ledger: &FailedUrlLedger,
    ) -> Result<ValidationOutcome, LedgerError> {
        let outcome = match self.classify_static(reference) {
            Some(outcome) => outcome,
            None if ledger.is_blacklisted(&reference.source_url).await? => {
                ValidationOutcome::PreviouslyFailed
            }
            None => ValidationOutcome::Eligible,
        };
        debug!(url = %reference.source_url, outcome = %outcome, "classified reference");
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&IngestConfig {
            base_urls: vec!["https://blog.example.org/".to_string()],
            excluded_domains: vec!["*.tracker.example".to_string(), "ads.example".to_string()],
            ..IngestConfig::default()
        })
    }

    fn outcome(url: &str) -> Option<ValidationOutcome> {
        classifier().classify_static(&MediaReference::image(url))
    }

    #[test]
    fn test_malformed_urls() {
        assert_eq!(outcome("/relative/a.jpg"), Some(ValidationOutcome::Malformed));
        assert_eq!(outcome("a.jpg"), Some(ValidationOutcome::Malformed));
        assert_eq!(
            outcome("data:image/png;base64,iVBORw0KGgo="),
            Some(ValidationOutcome::Malformed)
        );
        assert_eq!(outcome("ftp://ext.example/a.jpg"), Some(ValidationOutcome::Malformed));
        assert_eq!(outcome(""), Some(ValidationOutcome::Malformed));
    }

    #[test]
    fn test_protocol_relative_is_classified_as_https() {
        assert_eq!(outcome("//ext.example/a.jpg"), None);
        assert_eq!(
            outcome("//blog.example.org/media/a.jpg"),
            Some(ValidationOutcome::AlreadyLocal)
        );
    }

    #[test]
    fn test_already_local_ignores_scheme() {
        assert_eq!(
            outcome("http://blog.example.org/media/2026/01/a.jpg"),
            Some(ValidationOutcome::AlreadyLocal)
        );
        assert_eq!(
            outcome("https://BLOG.example.org/a.jpg"),
            Some(ValidationOutcome::AlreadyLocal)
        );
    }

    #[test]
    fn test_base_url_path_prefix_is_respected() {
        let classifier = Classifier::new(&IngestConfig {
            base_urls: vec!["https://host.example/site".to_string()],
            ..IngestConfig::default()
        });
        let local = MediaReference::image("https://host.example/site/a.jpg");
        let sibling = MediaReference::image("https://host.example/site-other/a.jpg");

        assert_eq!(classifier.classify_static(&local), Some(ValidationOutcome::AlreadyLocal));
        assert_eq!(classifier.classify_static(&sibling), None);
    }

    #[test]
    fn test_wildcard_exclusion_matches_subdomains_and_apex() {
        assert_eq!(
            outcome("https://img.tracker.example/p.gif"),
            Some(ValidationOutcome::ExcludedDomain)
        );
        assert_eq!(
            outcome("https://tracker.example/p.gif"),
            Some(ValidationOutcome::ExcludedDomain)
        );
        assert_eq!(outcome("https://nottracker.example/p.gif"), None);
    }

    #[test]
    fn test_bare_exclusion_matches_exact_host_only() {
        assert_eq!(
            outcome("https://ads.example/p.gif"),
            Some(ValidationOutcome::ExcludedDomain)
        );
        assert_eq!(outcome("https://cdn.ads.example/p.gif"), None);
    }

    #[test]
    fn test_is_dispatched() {
        assert!(ValidationOutcome::Eligible.is_dispatched());
        assert!(ValidationOutcome::PreviouslyFailed.is_dispatched());
        assert!(!ValidationOutcome::Malformed.is_dispatched());
        assert!(!ValidationOutcome::AlreadyLocal.is_dispatched());
        assert!(!ValidationOutcome::ExcludedDomain.is_dispatched());
    }

    #[tokio::test]
    async fn test_classify_consults_ledger_last() {
        let ledger = FailedUrlLedger::in_memory();
        ledger.add("https://ext.example/b.png").await.unwrap();
        ledger.add("https://blog.example.org/local.png").await.unwrap();
        let classifier = classifier();

        let failed = classifier
            .classify(&MediaReference::image("https://ext.example/b.png"), &ledger)
            .await
            .unwrap();
        let local = classifier
            .classify(&MediaReference::image("https://blog.example.org/local.png"), &ledger)
            .await
            .unwrap();
        let eligible = classifier
            .classify(&MediaReference::image("https://ext.example/a.jpg"), &ledger)
            .await
            .unwrap();

        assert_eq!(failed, ValidationOutcome::PreviouslyFailed);
        assert_eq!(local, ValidationOutcome::AlreadyLocal);
        assert_eq!(eligible, ValidationOutcome::Eligible);
    }

    #[test]
    fn test_fetchable_url_adds_https_to_protocol_relative() {
        let url = fetchable_url("//ext.example/a.jpg").unwrap();
        assert_eq!(url.as_str(), "https://ext.example/a.jpg");
        assert!(fetchable_url("mailto:someone@example.org").is_none());
    }
}
