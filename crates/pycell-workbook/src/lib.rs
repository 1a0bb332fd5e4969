//! Spreadsheet side of pycell: the sheet surface trait and an in-memory
//! workbook, the recognized cell formula, journaled sheet commands behind a
//! query/command mediator, array-formula synchronization and the host
//! session.

pub mod commands;
pub mod config;
pub mod error;
pub mod formula;
pub mod journal;
pub mod mediator;
pub mod memory;
pub mod session;
pub mod surface;
pub mod sync;

pub use config::{SessionConfig, SyncConfig};
pub use error::{ConfigError, SurfaceError};
pub use formula::FormulaMatcher;
pub use journal::{Command, CommandLog, Journal, MemoryLog, TracingLog};
pub use mediator::{CachePolicy, CacheStats, Mediator, Query, Trigger};
pub use memory::MemoryWorkbook;
pub use session::{Grid, Session};
pub use surface::{AnchoredFormula, SheetSurface};
pub use sync::{FormulaState, Synchronizer, Transition};
