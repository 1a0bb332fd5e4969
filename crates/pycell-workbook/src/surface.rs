//! What the engine needs from the host spreadsheet.
//!
//! Hosts implement [`SheetSurface`] over their own document model;
//! [`MemoryWorkbook`](crate::memory::MemoryWorkbook) is the in-process
//! implementation used by tests and headless sessions.

use pycell_common::{CellValue, Position, Rect};

use crate::error::SurfaceError;

/// Formula anchored at a cell, either plain or spanning an array range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredFormula {
    pub text: String,
    /// Array range anchored at the cell; `None` for a plain formula.
    pub array: Option<Rect>,
}

pub trait SheetSurface {
    fn sheet_count(&self) -> u32;

    fn sheet_name(&self, sheet: u32) -> Result<String, SurfaceError>;

    /// Stable unique id of a sheet, independent of its display name.
    fn sheet_uid(&self, sheet: u32) -> Result<String, SurfaceError>;

    /// Number of (rows, cols) addressable on every sheet.
    fn grid_size(&self) -> (u32, u32);

    fn is_protected(&self, sheet: u32) -> Result<bool, SurfaceError>;

    /// Formula whose anchor is `pos`. Cells covered by someone else's array
    /// report `None` here.
    fn formula(&self, pos: Position) -> Result<Option<AnchoredFormula>, SurfaceError>;

    /// Anchor of the array range covering `pos`, if any.
    fn array_owner(&self, pos: Position) -> Result<Option<Position>, SurfaceError>;

    fn value(&self, pos: Position) -> Result<CellValue, SurfaceError>;

    /// Set or clear the plain formula at `pos`.
    fn set_formula(&mut self, pos: Position, text: Option<&str>) -> Result<(), SurfaceError>;

    /// Enter `text` as an array formula over `rect`.
    fn set_array_formula(&mut self, rect: Rect, text: &str) -> Result<(), SurfaceError>;

    /// Remove the array formula anchored at `anchor`, leaving its cells empty.
    fn clear_array_formula(&mut self, anchor: Position) -> Result<(), SurfaceError>;

    fn set_value(&mut self, pos: Position, value: CellValue) -> Result<(), SurfaceError>;

    fn has_border(&self, rect: Rect) -> Result<bool, SurfaceError>;

    fn set_border(&mut self, rect: Rect, on: bool) -> Result<(), SurfaceError>;

    /// Code-name property attached to a cell.
    fn code_name(&self, pos: Position) -> Result<Option<String>, SurfaceError>;

    fn set_code_name(&mut self, pos: Position, name: Option<&str>) -> Result<(), SurfaceError>;

    /// Every cell on the document carrying a code-name, in position order.
    fn code_names(&self) -> Result<Vec<(Position, String)>, SurfaceError>;

    /// Whether `pos` holds content of its own (a value or an anchored
    /// formula).
    fn is_occupied(&self, pos: Position) -> Result<bool, SurfaceError> {
        if self.formula(pos)?.is_some() {
            return Ok(true);
        }
        Ok(!self.value(pos)?.is_empty())
    }
}
