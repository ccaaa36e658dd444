//! Resolves shader identifiers into compile-ready GLSL text.
//!
//! Shader files used by the bakers are plain GLSL with two preprocessing
//! conveniences layered on top:
//!
//! - `%KEY` tokens are replaced with caller supplied parameters (the compute
//!   baker uses this to inject workgroup geometry and output dimensions).
//! - `#include path` / `%include path` lines are replaced by the expanded
//!   contents of the referenced file.
//!
//! The expansion itself lives in [`expand`] and only depends on a
//! [`SourceLoader`]; [`FileSourceProvider`] and [`MemorySourceProvider`] are the
//! two loaders shipped with the crate.

mod expand;
mod provider;

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

pub use expand::{expand, substitute, Directive, MAX_INCLUDE_DEPTH};
pub use provider::{FileSourceProvider, MemorySourceProvider};

/// Substitution parameters keyed by name (without the leading `%`).
pub type SourceParams = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("shader source '{0}' not found")]
    NotFound(String),

    #[error("failed to read shader source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("include cycle detected: {0}")]
    IncludeCycle(String),

    #[error("include depth exceeded {limit} while expanding '{id}'")]
    TooDeep { id: String, limit: usize },
}

/// A single file fetched by a [`SourceLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    /// Canonical key used for cycle detection and nested include lookups.
    pub key: String,
    pub text: String,
}

/// Fetches raw (unexpanded) shader text.
pub trait SourceLoader {
    /// Loads `id`, optionally relative to the file identified by `parent`.
    fn load(&self, id: &str, parent: Option<&str>) -> Result<LoadedSource, SourceError>;
}

/// The contract the GPU pipeline depends on: identifier plus parameters in,
/// compile-ready text out.
pub trait SourceProvider: Send + Sync {
    fn resolve(&self, id: &str, params: &SourceParams) -> Result<String, SourceError>;
}

impl<T> SourceProvider for T
where
    T: SourceLoader + Send + Sync,
{
    fn resolve(&self, id: &str, params: &SourceParams) -> Result<String, SourceError> {
        expand(self, id, params)
    }
}

/// Builds a parameter map from `(key, value)` pairs.
pub fn params<I, K, V>(pairs: I) -> SourceParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.to_string()))
        .collect()
}
