//! Parsed input URLs.

use crate::error::{FetchError, Result};

/// A URL as handed to input schemes.
///
/// Wraps [`url::Url`] and keeps the original text for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    text: String,
    inner: ::url::Url,
}

impl ParsedUrl {
    pub fn parse(text: &str) -> Result<Self> {
        let inner =
            ::url::Url::parse(text).map_err(|e| FetchError::BadUrl(format!("'{text}': {e}")))?;
        Ok(Self {
            text: text.to_string(),
            inner,
        })
    }

    /// The URL exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Non-empty path segments, still percent-encoded.
    pub fn path_segments(&self) -> Vec<&str> {
        self.inner
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Decoded query parameters, in order, duplicates preserved.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.inner
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// The URL without query and fragment.
    pub fn without_query(&self) -> String {
        let mut base = self.inner.clone();
        base.set_query(None);
        base.set_fragment(None);
        base.to_string()
    }
}
