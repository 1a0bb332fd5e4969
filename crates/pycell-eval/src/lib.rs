pub mod args;
pub mod builtins;
pub mod classify;
pub mod config;
pub mod context;
pub mod document;
pub mod history;
pub mod interpreter;
pub mod manager;
pub mod modules;
pub mod namespace;
pub mod render;
pub mod sizer;
pub mod store;

pub use classify::{Classified, ClassifyInput, ClassifyRule, Classifier};
pub use config::EngineConfig;
pub use context::{ExecOutcome, ExecutionContext};
pub use document::{DocumentContext, DocumentId, DocumentRegistry};
pub use history::{StateHistory, StateItem, StateMeta};
pub use manager::{Fragment, SourceManager};
pub use namespace::Namespace;
pub use store::{FsStore, MemoryStore, SourceStore, StoreError};

#[cfg(test)]
mod tests;
