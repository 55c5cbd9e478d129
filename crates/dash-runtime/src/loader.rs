//! Module loader for Dash
//!
//! Reads module sources from disk and tracks which modules are currently
//! being evaluated. Evaluated modules are cached on the root environment, not
//! here, so each evaluation gets its own cache.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{DashError, EvalResult};

/// Module loader that handles reading Dash files
#[derive(Debug)]
pub struct ModuleLoader {
    /// Base path for resolving relative imports
    base_path: PathBuf,
    /// Modules whose evaluation has started but not finished
    in_progress: Vec<PathBuf>,
}

impl ModuleLoader {
    /// Create a new module loader with the given base path
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: normalize_path(base_path.as_ref()),
            in_progress: Vec::new(),
        }
    }

    /// Create a module loader with the current directory as base
    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Set the base path for resolving relative imports
    pub fn set_base_path(&mut self, path: impl AsRef<Path>) {
        self.base_path = normalize_path(path.as_ref());
    }

    /// Load module source from a path
    pub fn load_source(&self, path: &Path) -> EvalResult<String> {
        if !path.is_file() {
            return Err(DashError::ModuleNotFound(path.display().to_string()));
        }
        debug!(path = %path.display(), "reading module");
        std::fs::read_to_string(path)
            .map_err(|e| DashError::Io(format!("Failed to read '{}': {}", path.display(), e)))
    }

    /// Record that `path` is being evaluated
    pub fn begin(&mut self, path: &Path) -> EvalResult<()> {
        if self.in_progress.iter().any(|p| p == path) {
            return Err(DashError::CircularImport(path.display().to_string()));
        }
        self.in_progress.push(path.to_path_buf());
        Ok(())
    }

    /// Record that evaluation of `path` ended, successfully or not
    pub fn finish(&mut self, path: &Path) {
        if let Some(index) = self.in_progress.iter().rposition(|p| p == path) {
            self.in_progress.remove(index);
        }
    }

    pub fn is_loading(&self, path: &Path) -> bool {
        self.in_progress.iter().any(|p| p == path)
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::current_dir().unwrap_or_else(|_| Self::new("."))
    }
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_circular_detection() {
        let mut loader = ModuleLoader::new("/base");
        let path = Path::new("/base/a.dash");
        loader.begin(path).unwrap();
        assert!(loader.is_loading(path));
        assert_eq!(
            loader.begin(path),
            Err(DashError::CircularImport("/base/a.dash".to_string()))
        );
        loader.finish(path);
        assert!(!loader.is_loading(path));
        assert!(loader.begin(path).is_ok());
    }

    #[test]
    fn test_missing_module() {
        let loader = ModuleLoader::new("/base");
        let err = loader
            .load_source(Path::new("/definitely/not/here.dash"))
            .unwrap_err();
        assert_eq!(err.to_string(), "module '/definitely/not/here.dash' not found");
    }
}
