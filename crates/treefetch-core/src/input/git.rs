//! `git+<transport>://…` inputs, fetched from a local bare mirror.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use super::refs::{parse_rev, pointer_from_query};
use super::{Input, InputVariant, Override};
use crate::attrs::{Attr, Attrs, attrs, get_str, maybe_get_int, maybe_get_str};
use crate::context::FetchContext;
use crate::error::{FetchError, Result};
use crate::git::{GitMirror, clone_working_copy, commit_time};
use crate::hash::Hash;
use crate::parsed_url::ParsedUrl;
use crate::registry::InputScheme;
use crate::store::StorePath;
use crate::tree::Tree;

const TYPE: &str = "git";
const TRANSPORTS: &[&str] = &["https", "ssh", "http", "file"];
const ALLOWED_ATTRS: &[&str] = &["type", "url", "ref", "rev"];

/// A git repository reachable at `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInput {
    url: String,
    git_ref: Option<String>,
    rev: Option<Hash>,
}

impl GitInput {
    /// `url` is the transport URL, without the `git+` prefix.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            git_ref: None,
            rev: None,
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self.rev = None;
        self
    }

    pub fn with_rev(mut self, rev: Hash) -> Self {
        self.rev = Some(rev);
        self.git_ref = None;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn mutable_key(&self, git_ref: &str) -> Attrs {
        attrs([("type", TYPE), ("url", self.url.as_str()), ("ref", git_ref)])
    }

    fn immutable_key(&self, rev: &Hash) -> Attrs {
        attrs([
            ("type", TYPE.to_string()),
            ("url", self.url.clone()),
            ("rev", rev.git_rev()),
        ])
    }

    /// Export `rev` from the mirror and add it to the store.
    fn ingest(
        &self,
        ctx: &FetchContext,
        mirror: &GitMirror,
        rev: &Hash,
    ) -> Result<(StorePath, i64)> {
        let rev_text = rev.git_rev();
        let bare_dir = mirror.ensure_commit(&self.url, &rev_text)?;
        let last_modified = commit_time(&bare_dir, &rev_text)?;

        let staging = tempfile::tempdir().context("Failed to create export directory")?;
        let export_dir = staging.path().join("source");
        mirror.export(&bare_dir, &rev_text, &export_dir)?;

        tracing::info!(url = %self.url, rev = %rev_text, "adding git checkout to the store");
        let store_path = ctx.store().add_path("source", &export_dir)?;
        Ok((store_path, last_modified))
    }
}

impl InputVariant for GitInput {
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
        let mut attrs = Attrs::new();
        attrs.insert("url".into(), Attr::from(self.url.as_str()));
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
            "git input {} has both a ref and a rev",
            self.url
        );
        match (&self.git_ref, &self.rev) {
            (Some(git_ref), _) => format!("git+{}?ref={}", self.url, git_ref),
            (_, Some(rev)) => format!("git+{}?rev={}", self.url, rev.git_rev()),
            (None, None) => format!("git+{}", self.url),
        }
    }

    fn with_override(&self, pointer: &Override) -> Result<Arc<dyn InputVariant>> {
        let input = match pointer {
            Override::Ref(name) => self.clone().with_ref(name.clone()),
            Override::Rev(rev) => self.clone().with_rev(rev.clone()),
        };
        Ok(Arc::new(input))
    }

    fn clone_to(&self, _ctx: &FetchContext, dest_dir: &Path) -> Result<()> {
        let pointer = match (&self.rev, &self.git_ref) {
            (Some(rev), _) => rev.git_rev(),
            (None, Some(git_ref)) => git_ref.clone(),
            (None, None) => "HEAD".to_string(),
        };
        tracing::info!(
            url = %self.url,
            pointer = %pointer,
            dest = %dest_dir.display(),
            "cloning"
        );
        clone_working_copy(&self.url, dest_dir, &pointer)?;
        Ok(())
    }

    fn fetch_tree_internal(&self, ctx: &FetchContext) -> Result<(Tree, Input)> {
        let mirror = GitMirror::new(ctx.settings().cache_dir()?);
        let git_ref = self.git_ref.as_deref().unwrap_or("HEAD");
        let mutable_key = self.mutable_key(git_ref);

        let rev = match &self.rev {
            Some(rev) => rev.clone(),
            None => {
                if let Some((info, store_path)) = ctx.lookup_cache(&mutable_key)? {
                    let rev = parse_rev(get_str(&info, "rev")?)?;
                    let last_modified = maybe_get_int(&info, "lastModified")?;
                    let resolved = Input::new(self.clone().with_rev(rev));
                    return Ok((Tree::new(store_path, last_modified), resolved));
                }
                parse_rev(&mirror.resolve_ref(&self.url, git_ref)?)?
            }
        };

        let immutable_key = self.immutable_key(&rev);
        let (store_path, last_modified) = match ctx.lookup_cache(&immutable_key)? {
            Some((info, store_path)) => match maybe_get_int(&info, "lastModified")? {
                Some(last_modified) => (store_path, last_modified),
                None => self.ingest(ctx, &mirror, &rev)?,
            },
            None => self.ingest(ctx, &mirror, &rev)?,
        };

        let mut info = Attrs::new();
        info.insert("rev".into(), Attr::String(rev.git_rev()));
        info.insert("lastModified".into(), Attr::Int(last_modified));
        if self.rev.is_none() {
            ctx.add_to_cache(&mutable_key, &info, &store_path, false)?;
        }
        ctx.add_to_cache(&immutable_key, &info, &store_path, true)?;

        let resolved = Input::new(self.clone().with_rev(rev));
        Ok((Tree::new(store_path, Some(last_modified)), resolved))
    }
}

/// Parses `git+https`, `git+ssh`, `git+http` and `git+file` URLs and
/// `type = "git"` attribute sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitInputScheme;

impl InputScheme for GitInputScheme {
    fn id(&self) -> &'static str {
        TYPE
    }

    fn input_from_url(&self, url: &ParsedUrl) -> Result<Option<Input>> {
        let Some(transport) = url.scheme().strip_prefix("git+") else {
            return Ok(None);
        };
        if !TRANSPORTS.contains(&transport) {
            return Ok(None);
        }

        let (git_ref, rev) =
            pointer_from_query(url.as_str(), "git", &url.query_pairs(), None, None)?;
        let transport_url = url
            .without_query()
            .strip_prefix("git+")
            .map(str::to_string)
            .ok_or_else(|| FetchError::BadUrl(url.as_str().to_string()))?;

        Ok(Some(Input::new(GitInput {
            url: transport_url,
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
                "git input {} has both a branch/tag name and a commit hash",
                crate::attrs::attrs_to_json(attrs)
            )));
        }

        Ok(Some(Input::new(GitInput {
            url: get_str(attrs, "url")?.to_string(),
            git_ref,
            rev,
        })))
    }
}
