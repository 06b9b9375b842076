//! Input scheme registry.
//!
//! A scheme turns URLs or attribute sets into [`Input`]s. The registry asks
//! every registered scheme in turn and takes the first one that accepts.

use std::fmt;
use std::sync::OnceLock;

use crate::attrs::{Attrs, attrs_to_json, maybe_get_str};
use crate::error::{FetchError, Result};
use crate::hash::Hash;
use crate::input::{GitHubInputScheme, GitInputScheme, Input};
use crate::parsed_url::ParsedUrl;

/// Parser for one kind of input.
///
/// Both methods return `Ok(None)` when the scheme does not recognize the
/// input, and an error when it does but the input is malformed.
pub trait InputScheme: fmt::Debug + Send + Sync {
    /// Value of the `type` attribute this scheme handles.
    fn id(&self) -> &'static str;

    fn input_from_url(&self, url: &ParsedUrl) -> Result<Option<Input>>;

    /// `attrs` never contains `narHash`.
    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>>;
}

/// Ordered collection of input schemes.
#[derive(Debug)]
pub struct InputSchemeRegistry {
    schemes: Vec<Box<dyn InputScheme>>,
}

impl Default for InputSchemeRegistry {
    fn default() -> Self {
        Self::with_default_schemes()
    }
}

impl InputSchemeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            schemes: Vec::new(),
        }
    }

    /// Create a registry with the built-in schemes: GitHub, then Git.
    pub fn with_default_schemes() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GitHubInputScheme));
        registry.register(Box::new(GitInputScheme));
        registry
    }

    /// Process-wide registry with the built-in schemes.
    pub fn global() -> &'static InputSchemeRegistry {
        static GLOBAL: OnceLock<InputSchemeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::with_default_schemes)
    }

    /// Append a scheme; earlier registrations win.
    pub fn register(&mut self, scheme: Box<dyn InputScheme>) {
        self.schemes.push(scheme);
    }

    pub fn scheme_ids(&self) -> Vec<&'static str> {
        self.schemes.iter().map(|s| s.id()).collect()
    }

    pub fn input_from_url(&self, url: &str) -> Result<Input> {
        let parsed = ParsedUrl::parse(url)?;
        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_url(&parsed)? {
                tracing::debug!(scheme = scheme.id(), url, "parsed input");
                return Ok(input);
            }
        }
        Err(FetchError::UnsupportedInput(url.to_string()))
    }

    /// Parse an attribute set; a `narHash` attribute becomes the input's
    /// expected NAR hash.
    pub fn input_from_attrs(&self, attrs: &Attrs) -> Result<Input> {
        let nar_hash = maybe_get_str(attrs, "narHash")?
            .map(Hash::parse_any)
            .transpose()?;

        let mut variant_attrs = attrs.clone();
        variant_attrs.remove("narHash");

        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_attrs(&variant_attrs)? {
                return Ok(input.with_nar_hash(nar_hash));
            }
        }
        Err(FetchError::UnsupportedInput(attrs_to_json(attrs)))
    }
}
