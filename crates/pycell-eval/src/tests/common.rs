use pycell_common::{Position, ResultKind, Value};

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::manager::SourceManager;
use crate::store::MemoryStore;

pub fn manager() -> SourceManager {
    manager_with(EngineConfig::default())
}

pub fn manager_with(config: EngineConfig) -> SourceManager {
    SourceManager::new("doc-1", config, Box::new(MemoryStore::new()))
}

/// Cell in column A of the first sheet, zero-based row.
pub fn a(row: u32) -> Position {
    Position::new(0, row, 0)
}

pub fn code_name(pos: Position) -> String {
    format!("pycell_{}_{}_{}", pos.sheet, pos.row, pos.col)
}

pub fn add(mgr: &mut SourceManager, pos: Position, text: &str) {
    mgr.add_source(text, pos, &code_name(pos))
        .expect("add_source should succeed");
}

pub fn kind_at(mgr: &SourceManager, pos: Position) -> Option<ResultKind> {
    mgr.classify(pos, &Classifier::new()).map(|c| c.kind)
}

pub fn int_at(mgr: &SourceManager, pos: Position) -> Option<i64> {
    match mgr.value(pos) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}
