use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Semantic classification of a fragment's last value.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// The fragment produced no value, or an empty container/string.
    Empty,
    /// The value is Python `None`.
    None,
    Error,
    Scalar,
    /// A list of rows (or a flat list rendered as one column).
    Table,
    DataFrame,
    Series,
    Plot,
    Unrecognized,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultKind::Empty => "empty",
            ResultKind::None => "none",
            ResultKind::Error => "error",
            ResultKind::Scalar => "scalar",
            ResultKind::Table => "table",
            ResultKind::DataFrame => "data-frame",
            ResultKind::Series => "series",
            ResultKind::Plot => "plot",
            ResultKind::Unrecognized => "unrecognized",
        })
    }
}

/// Spreadsheet region (rows, cols) a value needs for display.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Footprint {
    pub rows: u32,
    pub cols: u32,
}

impl Footprint {
    pub const SCALAR: Footprint = Footprint { rows: 1, cols: 1 };

    pub const fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Fits in the anchor cell alone; an empty table counts as scalar.
    pub fn is_scalar(&self) -> bool {
        self.rows <= 1 && self.cols <= 1
    }

    /// Never smaller than one cell.
    pub fn clamped(&self) -> Self {
        Self::new(self.rows.max(1), self.cols.max(1))
    }
}

impl From<(u32, u32)> for Footprint {
    fn from((rows, cols): (u32, u32)) -> Self {
        Self::new(rows, cols)
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}
