//! Per-document engine state, created when a document opens and dropped
//! when it closes.

use std::collections::hash_map::Entry;
use std::fmt;

use pycell_common::EngineError;
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::manager::SourceManager;
use crate::store::SourceStore;

const CODE_NAME_PREFIX: &str = "pycell_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug)]
pub struct DocumentContext {
    id: DocumentId,
    manager: SourceManager,
    next_code_name: u64,
}

impl DocumentContext {
    pub fn new(id: DocumentId, config: EngineConfig, store: Box<dyn SourceStore>) -> Self {
        let manager = SourceManager::new(id.as_str(), config, store);
        Self {
            id,
            manager,
            next_code_name: 1,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn manager(&self) -> &SourceManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SourceManager {
        &mut self.manager
    }

    /// Next unused `pycell_<n>` code-name.
    pub fn allocate_code_name(&mut self) -> String {
        loop {
            let name = format!("{CODE_NAME_PREFIX}{}", self.next_code_name);
            self.next_code_name += 1;
            if self.manager.position_of(&name).is_none() {
                return name;
            }
        }
    }

    /// Make sure future allocations skip names already persisted in the
    /// document.
    pub fn observe_code_name(&mut self, name: &str) {
        if let Some(n) = name
            .strip_prefix(CODE_NAME_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
        {
            self.next_code_name = self.next_code_name.max(n + 1);
        }
    }
}

/// Open documents keyed by id.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: FxHashMap<DocumentId, DocumentContext>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the context for `id`, replacing any stale one.
    pub fn open(
        &mut self,
        id: DocumentId,
        config: EngineConfig,
        store: Box<dyn SourceStore>,
    ) -> &mut DocumentContext {
        tracing::info!(document = %id, "opening document");
        let ctx = DocumentContext::new(id.clone(), config, store);
        match self.documents.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(ctx);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(ctx),
        }
    }

    pub fn close(&mut self, id: &DocumentId) -> Option<DocumentContext> {
        tracing::info!(document = %id, "closing document");
        self.documents.remove(id)
    }

    pub fn get(&self, id: &DocumentId) -> Result<&DocumentContext, EngineError> {
        self.documents
            .get(id)
            .ok_or_else(|| EngineError::UnknownDocument(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &DocumentId) -> Result<&mut DocumentContext, EngineError> {
        self.documents
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownDocument(id.to_string()))
    }

    pub fn is_open(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn open(reg: &mut DocumentRegistry, id: &str) -> DocumentId {
        let id = DocumentId::from(id);
        reg.open(id.clone(), EngineConfig::default(), Box::new(MemoryStore::new()));
        id
    }

    #[test]
    fn code_names_are_sequential_and_skip_observed() {
        let mut reg = DocumentRegistry::new();
        let id = open(&mut reg, "doc");
        let doc = reg.get_mut(&id).unwrap();
        assert_eq!(doc.allocate_code_name(), "pycell_1");
        doc.observe_code_name("pycell_7");
        doc.observe_code_name("other_99");
        assert_eq!(doc.allocate_code_name(), "pycell_8");
    }

    #[test]
    fn documents_are_isolated() {
        let mut reg = DocumentRegistry::new();
        let a = open(&mut reg, "a");
        let b = open(&mut reg, "b");
        let pos = pycell_common::Position::new(0, 0, 0);
        reg.get_mut(&a)
            .unwrap()
            .manager_mut()
            .add_source("x = 1", pos, "pycell_1")
            .unwrap();
        assert!(reg.get(&a).unwrap().manager().namespace().contains("x"));
        assert!(!reg.get(&b).unwrap().manager().namespace().contains("x"));

        assert!(reg.close(&a).is_some());
        assert!(matches!(reg.get(&a), Err(EngineError::UnknownDocument(_))));
        assert_eq!(reg.len(), 1);
    }
}
