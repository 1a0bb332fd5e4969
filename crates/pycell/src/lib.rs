//! Meta crate that re-exports the pycell layers. Depend on this crate and
//! pick layers with feature flags; the underlying crates stay reachable
//! for deeper integration.

#[cfg(feature = "common")]
pub use pycell_common as common;

#[cfg(feature = "parse")]
pub use pycell_parse as parse;

#[cfg(feature = "eval")]
pub use pycell_eval as eval;

#[cfg(feature = "workbook")]
pub use pycell_workbook as workbook;

#[cfg(feature = "common")]
pub use pycell_common::{CellValue, EngineError, Footprint, Position, ResultKind, Value};

#[cfg(feature = "eval")]
pub use pycell_eval::{DocumentId, EngineConfig, FsStore, MemoryStore, SourceManager};

#[cfg(feature = "workbook")]
pub use pycell_workbook::{MemoryWorkbook, Session, SessionConfig, SheetSurface, SyncConfig};
