//! Error types shared by every fetcher component.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while parsing, resolving or fetching an input.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("bad URL: {0}")]
    BadUrl(String),

    #[error("unsupported {input_type} input attribute '{name}'")]
    UnsupportedAttribute { input_type: String, name: String },

    #[error("input attribute '{0}' is missing")]
    MissingAttribute(String),

    #[error("input attribute '{name}' is not a {expected}")]
    AttributeType { name: String, expected: &'static str },

    #[error("input '{0}' is unsupported")]
    UnsupportedInput(String),

    #[error("NAR hash mismatch in input '{input}' ({}), expected '{expected}', got '{got}'", .path.display())]
    HashMismatch {
        input: String,
        path: PathBuf,
        expected: String,
        got: String,
    },

    #[error("don't know how to apply '{value}' to '{input}'")]
    UnsupportedOverride { input: String, value: String },

    #[error("cannot override both the branch/tag and the commit of '{0}' at once")]
    ConflictingOverrides(String),

    #[error("invalid hash '{text}': {reason}")]
    BadHash { text: String, reason: String },

    #[error("path '{0}' is not a valid store path")]
    BadStorePath(String),

    #[error("path '{0}' is not valid in the store")]
    InvalidPath(String),

    #[error("failed to download '{url}': {reason}")]
    Download { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub(crate) fn bad_hash(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadHash {
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
