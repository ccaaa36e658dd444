use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{LoadedSource, SourceError, SourceLoader};

/// Loads shader files relative to a root directory.
///
/// Relative identifiers are tried against the root first, then against the
/// directory of the including file.
#[derive(Debug, Clone)]
pub struct FileSourceProvider {
    root: PathBuf,
}

impl FileSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, id: &str, parent: Option<&str>) -> Option<PathBuf> {
        let requested = Path::new(id);
        if requested.is_absolute() {
            return requested.is_file().then(|| requested.to_path_buf());
        }

        let from_root = self.root.join(requested);
        if from_root.is_file() {
            return Some(from_root);
        }

        parent
            .and_then(|parent| Path::new(parent).parent())
            .map(|dir| dir.join(requested))
            .filter(|candidate| candidate.is_file())
    }
}

impl SourceLoader for FileSourceProvider {
    fn load(&self, id: &str, parent: Option<&str>) -> Result<LoadedSource, SourceError> {
        let path = self
            .locate(id, parent)
            .ok_or_else(|| SourceError::NotFound(id.to_owned()))?;
        let text = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let key = fs::canonicalize(&path)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        Ok(LoadedSource { key, text })
    }
}

/// In-memory source table, handy for embedded shaders and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    sources: HashMap<String, String>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.sources.insert(normalize(&id.into()), text.into());
    }

    pub fn with(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }
}

impl SourceLoader for MemorySourceProvider {
    fn load(&self, id: &str, parent: Option<&str>) -> Result<LoadedSource, SourceError> {
        let direct = normalize(id);
        if let Some(text) = self.sources.get(&direct) {
            return Ok(LoadedSource {
                key: direct,
                text: text.clone(),
            });
        }

        if let Some((dir, _)) = parent.and_then(|parent| parent.rsplit_once('/')) {
            let nested = normalize(&format!("{dir}/{id}"));
            if let Some(text) = self.sources.get(&nested) {
                return Ok(LoadedSource {
                    key: nested,
                    text: text.clone(),
                });
            }
        }

        Err(SourceError::NotFound(id.to_owned()))
    }
}

fn normalize(id: &str) -> String {
    id.trim_start_matches("./").to_owned()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::{params, SourceParams, SourceProvider};

    #[test]
    fn resolves_files_relative_to_root_and_parent() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("gl/lib")).unwrap();
        fs::write(
            root.path().join("gl/main.fs"),
            "#include lib/common.glsl\nout vec4 color;",
        )
        .unwrap();
        fs::write(
            root.path().join("gl/lib/common.glsl"),
            "const float SCALE = %SCALE;",
        )
        .unwrap();

        let provider = FileSourceProvider::new(root.path());
        let text = provider
            .resolve("gl/main.fs", &params([("SCALE", 2.5)]))
            .expect("resolve");
        assert_eq!(text, "const float SCALE = 2.5;\nout vec4 color;");
    }

    #[test]
    fn missing_file_is_not_found() {
        let root = TempDir::new().unwrap();
        let provider = FileSourceProvider::new(root.path());
        let err = provider
            .resolve("nope.fs", &SourceParams::new())
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(ref id) if id == "nope.fs"));
    }

    #[test]
    fn memory_provider_strips_dot_prefix() {
        let provider = MemorySourceProvider::new().with("./gl/simple.vs", "void main() {}");
        let text = provider
            .resolve("gl/simple.vs", &SourceParams::new())
            .unwrap();
        assert_eq!(text, "void main() {}");
    }
}
