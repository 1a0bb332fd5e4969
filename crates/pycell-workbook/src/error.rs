use pycell_common::{EngineError, Position, Rect};
use thiserror::Error;

/// Failure reported by a [`SheetSurface`](crate::surface::SheetSurface).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    #[error("sheet {0} does not exist")]
    UnknownSheet(u32),

    #[error("cell {0} is outside the sheet")]
    OutOfBounds(Position),

    #[error("sheet {0} is protected")]
    Protected(u32),

    #[error("no array formula anchored at {0}")]
    NoArray(Position),

    #[error("array {0} overlaps another array formula")]
    ArrayOverlap(Rect),

    #[error("{0}")]
    Host(String),
}

impl SurfaceError {
    pub fn host(message: impl Into<String>) -> Self {
        SurfaceError::Host(message.into())
    }
}

impl From<SurfaceError> for EngineError {
    fn from(err: SurfaceError) -> Self {
        EngineError::collaborator("spreadsheet", err)
    }
}

/// Problems loading workbook-side configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "json")]
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
