//! `github:<owner>/<repo>[/<ref-or-rev>]` inputs, fetched as tarballs through
//! the GitHub REST API.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::refs::{DEFAULT_REF, is_ref, is_rev, parse_rev, pointer_from_query};
use super::{Input, InputVariant, Override};
use crate::attrs::{Attr, Attrs, get_str, maybe_get_int, maybe_get_str};
use crate::context::FetchContext;
use crate::download::{CachedDownloadRequest, IMMUTABLE_TTL};
use crate::error::{FetchError, Result};
use crate::hash::Hash;
use crate::parsed_url::ParsedUrl;
use crate::registry::InputScheme;
use crate::store::StorePath;
use crate::tree::Tree;

const TYPE: &str = "github";
const API_BASE: &str = "https://api.github.com";
const ALLOWED_ATTRS: &[&str] = &["type", "owner", "repo", "ref", "rev"];

/// A repository on GitHub, optionally pinned to a branch/tag or a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubInput {
    owner: String,
    repo: String,
    git_ref: Option<String>,
    rev: Option<Hash>,
}

/// Response of `GET /repos/{owner}/{repo}/commits/{ref}`; only the hash is used.
#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

impl GitHubInput {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            git_ref: None,
            rev: None,
        }
    }

    /// Point at a branch or tag, dropping any commit.
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self.rev = None;
        self
    }

    /// Pin to a commit, dropping any branch or tag.
    pub fn with_rev(mut self, rev: Hash) -> Self {
        self.rev = Some(rev);
        self.git_ref = None;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn api_url(&self, endpoint: &str, pointer: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}/{}",
            API_BASE, self.owner, self.repo, endpoint, pointer
        )
    }

    fn mutable_key(&self, git_ref: &str) -> Attrs {
        crate::attrs::attrs([
            ("type", TYPE),
            ("owner", self.owner.as_str()),
            ("repo", self.repo.as_str()),
            ("ref", git_ref),
        ])
    }

    fn resolve_rev(&self, ctx: &FetchContext, git_ref: &str) -> Result<Hash> {
        let url = self.api_url("commits", git_ref);
        let request = CachedDownloadRequest::new(&url).with_ttl(ctx.settings().tarball_ttl());
        let result = ctx.downloader().download_cached(ctx.store(), &request)?;

        let body = std::fs::read_to_string(&result.path)?;
        let info: CommitInfo = serde_json::from_str(&body)?;
        let rev = parse_rev(&info.sha)
            .map_err(|e| FetchError::download(&url, format!("bad commit hash in response: {e}")))?;

        tracing::debug!("HEAD revision for '{}' is {}", url, rev.git_rev());
        Ok(rev)
    }

    fn download_tarball(&self, ctx: &FetchContext, rev: &Hash) -> Result<(StorePath, i64)> {
        let url = self.api_url("tarball", &rev.git_rev());
        let request = CachedDownloadRequest::new(&url)
            .unpacked("source")
            .with_ttl(IMMUTABLE_TTL)
            .with_last_modified()
            .with_access_token(ctx.settings().github_access_token().map(str::to_string));

        tracing::info!(
            owner = %self.owner,
            repo = %self.repo,
            rev = %rev.git_rev(),
            "downloading GitHub tarball"
        );
        let result = ctx.downloader().download_cached(ctx.store(), &request)?;

        let store_path = result
            .store_path
            .ok_or_else(|| FetchError::download(&url, "tarball was not unpacked into the store"))?;
        let last_modified = result
            .last_modified
            .ok_or_else(|| FetchError::download(&url, "no last-modified time for tarball"))?;
        Ok((store_path, last_modified))
    }

    fn resolved(&self, rev: Hash) -> Input {
        Input::new(self.clone().with_rev(rev))
    }
}

/// The `rev`/`lastModified` pair recorded for every fetch.
fn info_attrs(rev: &Hash, last_modified: i64) -> Attrs {
    let mut info = Attrs::new();
    info.insert("rev".into(), Attr::String(rev.git_rev()));
    info.insert("lastModified".into(), Attr::Int(last_modified));
    info
}

fn immutable_key(rev: &Hash) -> Attrs {
    crate::attrs::attrs([("type", "git-tarball".to_string()), ("rev", rev.git_rev())])
}

impl InputVariant for GitHubInput {
    fn type_tag(&self) -> &'static str {
        TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn InputVariant) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn get_ref(&self) -> Option<&str> {
        self.git_ref.as_deref()
    }

    fn get_rev(&self) -> Option<&Hash> {
        self.rev.as_ref()
    }

    fn canonical_attrs(&self) -> Attrs {
        let mut attrs = crate::attrs::attrs([
            ("owner", self.owner.as_str()),
            ("repo", self.repo.as_str()),
        ]);
        if let Some(git_ref) = &self.git_ref {
            attrs.insert("ref".into(), Attr::from(git_ref.as_str()));
        }
        if let Some(rev) = &self.rev {
            attrs.insert("rev".into(), Attr::String(rev.git_rev()));
        }
        attrs
    }

    fn to_display_string(&self) -> String {
        assert!(
            self.git_ref.is_none() || self.rev.is_none(),
            "GitHub input {}/{} has both a ref and a rev",
            self.owner,
            self.repo
        );
        let mut text = format!("github:{}/{}", self.owner, self.repo);
        match (&self.git_ref, &self.rev) {
            // A slash would read as an extra path segment.
            (Some(git_ref), _) if git_ref.contains('/') => {
                text.push_str("?ref=");
                text.push_str(git_ref);
            }
            (Some(git_ref), _) => {
                text.push('/');
                text.push_str(git_ref);
            }
            (None, Some(rev)) => {
                text.push('/');
                text.push_str(&rev.git_rev());
            }
            (None, None) => {}
        }
        text
    }

    fn with_override(&self, pointer: &Override) -> Result<Arc<dyn InputVariant>> {
        let input = match pointer {
            Override::Ref(name) => self.clone().with_ref(name.clone()),
            Override::Rev(rev) => self.clone().with_rev(rev.clone()),
        };
        Ok(Arc::new(input))
    }

    fn clone_to(&self, ctx: &FetchContext, dest_dir: &Path) -> Result<()> {
        let url = format!("git+ssh://git@github.com/{}/{}.git", self.owner, self.repo);
        let git_input = ctx.input_from_url(&url)?;
        let git_input = match &self.rev {
            Some(rev) => git_input.apply_overrides(None, Some(rev.clone()))?,
            None => git_input.apply_overrides(
                Some(self.git_ref.clone().unwrap_or_else(|| DEFAULT_REF.to_string())),
                None,
            )?,
        };
        git_input.clone_to(ctx, dest_dir)
    }

    fn fetch_tree_internal(&self, ctx: &FetchContext) -> Result<(Tree, Input)> {
        let git_ref = self.git_ref.as_deref().unwrap_or(DEFAULT_REF);
        let mutable_key = self.mutable_key(git_ref);

        let rev = match &self.rev {
            Some(rev) => rev.clone(),
            None => {
                if let Some((info, store_path)) = ctx.lookup_cache(&mutable_key)? {
                    let rev = parse_rev(get_str(&info, "rev")?)?;
                    let last_modified = maybe_get_int(&info, "lastModified")?;
                    return Ok((Tree::new(store_path, last_modified), self.resolved(rev)));
                }
                self.resolve_rev(ctx, git_ref)?
            }
        };

        let immutable_key = immutable_key(&rev);
        let (store_path, last_modified) = match ctx.lookup_cache(&immutable_key)? {
            Some((info, store_path)) => {
                let last_modified = maybe_get_int(&info, "lastModified")?;
                (store_path, last_modified)
            }
            None => {
                let (store_path, last_modified) = self.download_tarball(ctx, &rev)?;
                (store_path, Some(last_modified))
            }
        };

        if let Some(last_modified) = last_modified {
            let info = info_attrs(&rev, last_modified);
            if self.rev.is_none() {
                ctx.add_to_cache(&mutable_key, &info, &store_path, false)?;
            }
            ctx.add_to_cache(&immutable_key, &info, &store_path, true)?;
        }

        Ok((Tree::new(store_path, last_modified), self.resolved(rev)))
    }
}

/// Parses `github:` URLs and `type = "github"` attribute sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubInputScheme;

impl InputScheme for GitHubInputScheme {
    fn id(&self) -> &'static str {
        TYPE
    }

    fn input_from_url(&self, url: &ParsedUrl) -> Result<Option<Input>> {
        if url.scheme() != TYPE {
            return Ok(None);
        }

        let segments = url.path_segments();
        let (owner, repo, pointer) = match segments.as_slice() {
            [owner, repo] => (*owner, *repo, None),
            [owner, repo, pointer] => (*owner, *repo, Some(*pointer)),
            _ => {
                return Err(FetchError::BadUrl(format!(
                    "GitHub URL '{}' is invalid",
                    url.as_str()
                )));
            }
        };

        let (mut git_ref, mut rev) = (None, None);
        if let Some(pointer) = pointer {
            if is_rev(pointer) {
                rev = Some(parse_rev(pointer)?);
            } else if is_ref(pointer) {
                git_ref = Some(pointer.to_string());
            } else {
                return Err(FetchError::BadUrl(format!(
                    "in GitHub URL '{}', '{}' is not a commit hash or branch/tag name",
                    url.as_str(),
                    pointer
                )));
            }
        }

        let (git_ref, rev) =
            pointer_from_query(url.as_str(), "GitHub", &url.query_pairs(), git_ref, rev)?;

        Ok(Some(Input::new(GitHubInput {
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref,
            rev,
        })))
    }

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>> {
        if maybe_get_str(attrs, "type")? != Some(TYPE) {
            return Ok(None);
        }

        if let Some(name) = attrs.keys().find(|k| !ALLOWED_ATTRS.contains(&k.as_str())) {
            return Err(FetchError::UnsupportedAttribute {
                input_type: TYPE.to_string(),
                name: name.clone(),
            });
        }

        let git_ref = maybe_get_str(attrs, "ref")?.map(str::to_string);
        let rev = maybe_get_str(attrs, "rev")?.map(parse_rev).transpose()?;
        if git_ref.is_some() && rev.is_some() {
            return Err(FetchError::BadUrl(format!(
                "GitHub input {} has both a branch/tag name and a commit hash",
                crate::attrs::attrs_to_json(attrs)
            )));
        }

        Ok(Some(Input::new(GitHubInput {
            owner: get_str(attrs, "owner")?.to_string(),
            repo: get_str(attrs, "repo")?.to_string(),
            git_ref,
            rev,
        })))
    }
}
