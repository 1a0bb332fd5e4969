//! Backing stores for fragment source text, addressed by [`SourceLocator`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pycell_common::{EngineError, SourceLocator};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no source stored at {0}")]
    NotFound(SourceLocator),

    #[error("container for {0} does not exist")]
    MissingContainer(SourceLocator),

    #[error("i/o failure at {locator}: {source}")]
    Io {
        locator: SourceLocator,
        #[source]
        source: io::Error,
    },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::collaborator("source store", err)
    }
}

/// Where fragment text lives between sessions.
pub trait SourceStore {
    fn exists(&self, locator: &SourceLocator) -> bool;
    fn read(&self, locator: &SourceLocator) -> Result<String, StoreError>;
    fn write(&mut self, locator: &SourceLocator, text: &str) -> Result<(), StoreError>;
    /// Removing text that is not there is not an error.
    fn delete(&mut self, locator: &SourceLocator) -> Result<(), StoreError>;
    /// Create the directory-like container `locator` lives in.
    fn ensure_container(&mut self, locator: &SourceLocator) -> Result<(), StoreError>;
}

/// In-process store; containers must be ensured before writing, like on disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: FxHashMap<String, String>,
    containers: FxHashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceStore for MemoryStore {
    fn exists(&self, locator: &SourceLocator) -> bool {
        self.files.contains_key(&locator.to_string())
    }

    fn read(&self, locator: &SourceLocator) -> Result<String, StoreError> {
        self.files
            .get(&locator.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(locator.clone()))
    }

    fn write(&mut self, locator: &SourceLocator, text: &str) -> Result<(), StoreError> {
        let container = format!("{}:/{}", locator.scheme, locator.container_path());
        if !self.containers.contains(&container) {
            return Err(StoreError::MissingContainer(locator.clone()));
        }
        self.files.insert(locator.to_string(), text.to_string());
        Ok(())
    }

    fn delete(&mut self, locator: &SourceLocator) -> Result<(), StoreError> {
        self.files.remove(&locator.to_string());
        Ok(())
    }

    fn ensure_container(&mut self, locator: &SourceLocator) -> Result<(), StoreError> {
        self.containers
            .insert(format!("{}:/{}", locator.scheme, locator.container_path()));
        Ok(())
    }
}

/// Maps locators to files below `root`, ignoring the scheme.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, locator: &SourceLocator) -> PathBuf {
        self.root.join(locator.relative_path())
    }

    fn io(locator: &SourceLocator) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            locator: locator.clone(),
            source,
        }
    }
}

impl SourceStore for FsStore {
    fn exists(&self, locator: &SourceLocator) -> bool {
        self.path_of(locator).is_file()
    }

    fn read(&self, locator: &SourceLocator) -> Result<String, StoreError> {
        match fs::read_to_string(self.path_of(locator)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(locator.clone()))
            }
            Err(e) => Err(Self::io(locator)(e)),
        }
    }

    fn write(&mut self, locator: &SourceLocator, text: &str) -> Result<(), StoreError> {
        let path = self.path_of(locator);
        if path.parent().is_some_and(|dir| !dir.is_dir()) {
            return Err(StoreError::MissingContainer(locator.clone()));
        }
        fs::write(path, text).map_err(Self::io(locator))
    }

    fn delete(&mut self, locator: &SourceLocator) -> Result<(), StoreError> {
        match fs::remove_file(self.path_of(locator)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Self::io(locator)(e)),
            _ => Ok(()),
        }
    }

    fn ensure_container(&mut self, locator: &SourceLocator) -> Result<(), StoreError> {
        let dir = self.root.join(locator.container_path());
        fs::create_dir_all(dir).map_err(Self::io(locator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(name: &str) -> SourceLocator {
        SourceLocator::new("mem", "doc1", "pycell", "sheet-a", name).unwrap()
    }

    fn exercise(store: &mut dyn SourceStore) {
        let a = loc("pycell_1");
        assert!(!store.exists(&a));
        assert!(matches!(store.write(&a, "x = 1"), Err(StoreError::MissingContainer(_))));
        store.ensure_container(&a).unwrap();
        store.write(&a, "x = 1").unwrap();
        assert!(store.exists(&a));
        assert_eq!(store.read(&a).unwrap(), "x = 1");
        store.write(&a, "x = 2").unwrap();
        assert_eq!(store.read(&a).unwrap(), "x = 2");
        store.delete(&a).unwrap();
        assert!(!store.exists(&a));
        assert!(matches!(store.read(&a), Err(StoreError::NotFound(_))));
        store.delete(&a).unwrap();
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::new(dir.path());
        exercise(&mut store);
        assert!(dir.path().join("doc1/pycell/sheet-a").is_dir());
    }

    #[test]
    fn store_errors_become_collaborator_failures() {
        let err: EngineError = StoreError::NotFound(loc("pycell_9")).into();
        assert!(matches!(err, EngineError::CollaboratorQuery { .. }));
    }
}
