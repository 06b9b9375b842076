//! Branch/tag name and commit hash patterns shared by git-based inputs.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{FetchError, Result};
use crate::hash::{Hash, HashAlgorithm};

/// Branch used when an input names neither a ref nor a rev.
pub const DEFAULT_REF: &str = "master";

static REV_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("valid regex"));

static REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-/]*$").expect("valid regex"));

/// Whether `text` looks like a full commit hash.
pub fn is_rev(text: &str) -> bool {
    REV_REGEX.is_match(text)
}

/// Whether `text` is an acceptable branch or tag name.
pub fn is_ref(text: &str) -> bool {
    REF_REGEX.is_match(text)
        && !text.contains("..")
        && !text.contains("//")
        && !text.ends_with('/')
        && !text.ends_with(".lock")
}

/// Parse a commit hash from base16 text.
pub fn parse_rev(text: &str) -> Result<Hash> {
    Hash::parse_hex(&text.to_ascii_lowercase(), HashAlgorithm::Sha1)
}

/// Parse the `rev`/`ref` query parameters of a git-based URL, rejecting
/// duplicates and combinations.
pub(crate) fn pointer_from_query(
    url_text: &str,
    kind: &str,
    query: &[(String, String)],
    mut git_ref: Option<String>,
    mut rev: Option<Hash>,
) -> Result<(Option<String>, Option<Hash>)> {
    for (name, value) in query {
        match name.as_str() {
            "rev" => {
                if rev.is_some() {
                    return Err(FetchError::BadUrl(format!(
                        "{kind} URL '{url_text}' contains multiple commit hashes"
                    )));
                }
                if !is_rev(value) {
                    return Err(FetchError::BadUrl(format!(
                        "{kind} URL '{url_text}' contains an invalid commit hash"
                    )));
                }
                rev = Some(parse_rev(value)?);
            }
            "ref" => {
                if !is_ref(value) {
                    return Err(FetchError::BadUrl(format!(
                        "{kind} URL '{url_text}' contains an invalid branch/tag name"
                    )));
                }
                if git_ref.is_some() {
                    return Err(FetchError::BadUrl(format!(
                        "{kind} URL '{url_text}' contains multiple branch/tag names"
                    )));
                }
                git_ref = Some(value.clone());
            }
            _ => {}
        }
    }

    if git_ref.is_some() && rev.is_some() {
        return Err(FetchError::BadUrl(format!(
            "{kind} URL '{url_text}' contains both a commit hash and a branch/tag name"
        )));
    }
    Ok((git_ref, rev))
}
