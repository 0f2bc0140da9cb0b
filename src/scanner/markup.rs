//! Markup spellings of URLs that the rewriter must match in raw text.

/// The entity-encoded spellings of a URL that editors commonly emit for `&`.
#[must_use]
pub fn encoded_url_forms(url: &str) -> Vec<String> {
    if !url.contains('&') {
        return Vec::new();
    }
    vec![url.replace('&', "&amp;"), url.replace('&', "&#038;")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_url_forms() {
        assert!(encoded_url_forms("https://x.example/a.jpg").is_empty());
        assert_eq!(
            encoded_url_forms("https://x.example/a.jpg?a=1&b=2"),
            vec![
                "https://x.example/a.jpg?a=1&amp;b=2".to_string(),
                "https://x.example/a.jpg?a=1&#038;b=2".to_string(),
            ]
        );
    }
}
