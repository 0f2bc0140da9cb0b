//! Constants for the download module.

/// Upper bound on backoff units between two attempts.
pub const MAX_BACKOFF_UNITS: u32 = 3;

/// Bytes inspected when sniffing the content type.
pub const SNIFF_LEN: usize = 512;

/// Default User-Agent for media requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    format!("media-ingest/{}", env!("CARGO_PKG_VERSION"))
}
