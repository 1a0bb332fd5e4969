//! In-process [`SheetSurface`] with just enough spreadsheet behavior for
//! the synchronizer: plain and array formulas, values, borders, protection
//! and code-name properties.

use std::collections::BTreeMap;

use pycell_common::{CellValue, Position, Rect};
use rustc_hash::FxHashSet;

use crate::error::SurfaceError;
use crate::surface::{AnchoredFormula, SheetSurface};

/// Row and column counts of a modern spreadsheet grid.
pub const DEFAULT_GRID: (u32, u32) = (1_048_576, 16_384);

#[derive(Debug, Clone)]
struct SheetInfo {
    name: String,
    uid: String,
    protected: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Cell {
    value: Option<CellValue>,
    formula: Option<String>,
    code_name: Option<String>,
}

impl Cell {
    fn is_blank(&self) -> bool {
        self.value.is_none() && self.formula.is_none() && self.code_name.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryWorkbook {
    sheets: Vec<SheetInfo>,
    cells: BTreeMap<Position, Cell>,
    arrays: BTreeMap<Position, (Rect, String)>,
    borders: FxHashSet<Rect>,
    grid: (u32, u32),
}

impl Default for MemoryWorkbook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkbook {
    /// One sheet named `Sheet1`.
    pub fn new() -> Self {
        let mut wb = Self::empty();
        wb.add_sheet("Sheet1");
        wb
    }

    pub fn empty() -> Self {
        Self {
            sheets: Vec::new(),
            cells: BTreeMap::new(),
            arrays: BTreeMap::new(),
            borders: FxHashSet::default(),
            grid: DEFAULT_GRID,
        }
    }

    pub fn with_grid(mut self, rows: u32, cols: u32) -> Self {
        self.grid = (rows, cols);
        self
    }

    /// Append a sheet and return its index. Unique ids are allocated once
    /// and survive renames.
    pub fn add_sheet(&mut self, name: &str) -> u32 {
        let index = self.sheets.len() as u32;
        self.sheets.push(SheetInfo {
            name: name.to_string(),
            uid: format!("s{:04}", index + 1),
            protected: false,
        });
        index
    }

    pub fn rename_sheet(&mut self, sheet: u32, name: &str) -> Result<(), SurfaceError> {
        self.sheet_mut(sheet)?.name = name.to_string();
        Ok(())
    }

    pub fn protect(&mut self, sheet: u32, on: bool) -> Result<(), SurfaceError> {
        self.sheet_mut(sheet)?.protected = on;
        Ok(())
    }

    /// Values of `rect`, row by row.
    pub fn values(&self, rect: Rect) -> Vec<Vec<CellValue>> {
        (0..rect.rows)
            .map(|r| {
                (0..rect.cols)
                    .map(|c| self.stored_value(rect.anchor.offset(r, c)))
                    .collect()
            })
            .collect()
    }

    pub fn arrays(&self) -> impl Iterator<Item = (&Rect, &str)> {
        self.arrays.values().map(|(rect, text)| (rect, text.as_str()))
    }

    pub fn bordered(&self) -> impl Iterator<Item = &Rect> {
        self.borders.iter()
    }

    fn sheet(&self, sheet: u32) -> Result<&SheetInfo, SurfaceError> {
        self.sheets
            .get(sheet as usize)
            .ok_or(SurfaceError::UnknownSheet(sheet))
    }

    fn sheet_mut(&mut self, sheet: u32) -> Result<&mut SheetInfo, SurfaceError> {
        self.sheets
            .get_mut(sheet as usize)
            .ok_or(SurfaceError::UnknownSheet(sheet))
    }

    fn check(&self, pos: Position) -> Result<(), SurfaceError> {
        self.sheet(pos.sheet)?;
        if pos.row >= self.grid.0 || pos.col >= self.grid.1 {
            return Err(SurfaceError::OutOfBounds(pos));
        }
        Ok(())
    }

    fn check_writable(&self, pos: Position) -> Result<(), SurfaceError> {
        self.check(pos)?;
        if self.sheet(pos.sheet)?.protected {
            return Err(SurfaceError::Protected(pos.sheet));
        }
        Ok(())
    }

    fn check_rect(&self, rect: Rect) -> Result<(), SurfaceError> {
        self.check_writable(rect.anchor)?;
        let corner = Position::new(rect.anchor.sheet, rect.end_row(), rect.end_col());
        self.check(corner)
    }

    fn stored_value(&self, pos: Position) -> CellValue {
        self.cells
            .get(&pos)
            .and_then(|c| c.value.clone())
            .unwrap_or(CellValue::Empty)
    }

    fn update(&mut self, pos: Position, f: impl FnOnce(&mut Cell)) {
        let cell = self.cells.entry(pos).or_default();
        f(cell);
        if cell.is_blank() {
            self.cells.remove(&pos);
        }
    }

    fn overlapping_array(&self, rect: Rect) -> Option<Rect> {
        self.arrays
            .values()
            .map(|(r, _)| *r)
            .find(|r| r.anchor.sheet == rect.anchor.sheet && overlaps(r, &rect))
    }
}

fn overlaps(a: &Rect, b: &Rect) -> bool {
    a.anchor.row <= b.end_row()
        && b.anchor.row <= a.end_row()
        && a.anchor.col <= b.end_col()
        && b.anchor.col <= a.end_col()
}

impl SheetSurface for MemoryWorkbook {
    fn sheet_count(&self) -> u32 {
        self.sheets.len() as u32
    }

    fn sheet_name(&self, sheet: u32) -> Result<String, SurfaceError> {
        Ok(self.sheet(sheet)?.name.clone())
    }

    fn sheet_uid(&self, sheet: u32) -> Result<String, SurfaceError> {
        Ok(self.sheet(sheet)?.uid.clone())
    }

    fn grid_size(&self) -> (u32, u32) {
        self.grid
    }

    fn is_protected(&self, sheet: u32) -> Result<bool, SurfaceError> {
        Ok(self.sheet(sheet)?.protected)
    }

    fn formula(&self, pos: Position) -> Result<Option<AnchoredFormula>, SurfaceError> {
        self.check(pos)?;
        if let Some((rect, text)) = self.arrays.get(&pos) {
            return Ok(Some(AnchoredFormula {
                text: text.clone(),
                array: Some(*rect),
            }));
        }
        Ok(self
            .cells
            .get(&pos)
            .and_then(|c| c.formula.clone())
            .map(|text| AnchoredFormula { text, array: None }))
    }

    fn array_owner(&self, pos: Position) -> Result<Option<Position>, SurfaceError> {
        self.check(pos)?;
        Ok(self
            .arrays
            .values()
            .find(|(rect, _)| rect.contains(pos))
            .map(|(rect, _)| rect.anchor))
    }

    fn value(&self, pos: Position) -> Result<CellValue, SurfaceError> {
        self.check(pos)?;
        Ok(self.stored_value(pos))
    }

    fn set_formula(&mut self, pos: Position, text: Option<&str>) -> Result<(), SurfaceError> {
        self.check_writable(pos)?;
        if let Some(rect) = self.overlapping_array(Rect::single(pos)) {
            return Err(SurfaceError::ArrayOverlap(rect));
        }
        let text = text.map(str::to_string);
        self.update(pos, |cell| {
            if text.is_some() {
                cell.value = None;
            }
            cell.formula = text;
        });
        Ok(())
    }

    fn set_array_formula(&mut self, rect: Rect, text: &str) -> Result<(), SurfaceError> {
        self.check_rect(rect)?;
        if let Some(existing) = self.overlapping_array(rect) {
            return Err(SurfaceError::ArrayOverlap(existing));
        }
        self.update(rect.anchor, |cell| cell.formula = None);
        self.arrays.insert(rect.anchor, (rect, text.to_string()));
        Ok(())
    }

    fn clear_array_formula(&mut self, anchor: Position) -> Result<(), SurfaceError> {
        self.check_writable(anchor)?;
        let (rect, _) = self
            .arrays
            .remove(&anchor)
            .ok_or(SurfaceError::NoArray(anchor))?;
        for pos in rect.cells() {
            self.update(pos, |cell| cell.value = None);
        }
        Ok(())
    }

    fn set_value(&mut self, pos: Position, value: CellValue) -> Result<(), SurfaceError> {
        self.check_writable(pos)?;
        self.update(pos, |cell| {
            cell.value = (!value.is_empty()).then_some(value);
        });
        Ok(())
    }

    fn has_border(&self, rect: Rect) -> Result<bool, SurfaceError> {
        Ok(self.borders.contains(&rect))
    }

    fn set_border(&mut self, rect: Rect, on: bool) -> Result<(), SurfaceError> {
        self.check_rect(rect)?;
        if on {
            self.borders.insert(rect);
        } else {
            self.borders.remove(&rect);
        }
        Ok(())
    }

    fn code_name(&self, pos: Position) -> Result<Option<String>, SurfaceError> {
        self.check(pos)?;
        Ok(self.cells.get(&pos).and_then(|c| c.code_name.clone()))
    }

    fn set_code_name(&mut self, pos: Position, name: Option<&str>) -> Result<(), SurfaceError> {
        self.check_writable(pos)?;
        let name = name.map(str::to_string);
        self.update(pos, |cell| cell.code_name = name);
        Ok(())
    }

    fn code_names(&self) -> Result<Vec<(Position, String)>, SurfaceError> {
        Ok(self
            .cells
            .iter()
            .filter_map(|(pos, c)| c.code_name.clone().map(|n| (*pos, n)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(row: u32, col: u32) -> Position {
        Position::new(0, row, col)
    }

    #[test]
    fn arrays_own_their_cells() {
        let mut wb = MemoryWorkbook::new();
        let rect = Rect::new(at(1, 1), 2, 2);
        wb.set_array_formula(rect, "=F()").unwrap();
        assert_eq!(wb.array_owner(at(2, 2)).unwrap(), Some(at(1, 1)));
        assert_eq!(wb.formula(at(2, 2)).unwrap(), None);
        assert_eq!(wb.formula(at(1, 1)).unwrap().unwrap().array, Some(rect));
        assert!(matches!(
            wb.set_formula(at(2, 1), Some("=G()")),
            Err(SurfaceError::ArrayOverlap(_))
        ));
        assert!(matches!(
            wb.set_array_formula(Rect::new(at(0, 0), 2, 2), "=H()"),
            Err(SurfaceError::ArrayOverlap(_))
        ));
    }

    #[test]
    fn clearing_an_array_empties_its_values() {
        let mut wb = MemoryWorkbook::new();
        let rect = Rect::new(at(0, 0), 1, 2);
        wb.set_array_formula(rect, "=F()").unwrap();
        wb.set_value(at(0, 1), CellValue::Number(2.0)).unwrap();
        wb.clear_array_formula(at(0, 0)).unwrap();
        assert_eq!(wb.value(at(0, 1)).unwrap(), CellValue::Empty);
        assert_eq!(wb.arrays().count(), 0);
        assert_eq!(
            wb.clear_array_formula(at(0, 0)),
            Err(SurfaceError::NoArray(at(0, 0)))
        );
    }

    #[test]
    fn protection_and_bounds() {
        let mut wb = MemoryWorkbook::new().with_grid(10, 5);
        assert_eq!(
            wb.set_value(at(10, 0), CellValue::Boolean(true)),
            Err(SurfaceError::OutOfBounds(at(10, 0)))
        );
        wb.protect(0, true).unwrap();
        assert_eq!(
            wb.set_formula(at(0, 0), Some("=1")),
            Err(SurfaceError::Protected(0))
        );
        assert_eq!(wb.sheet_uid(3), Err(SurfaceError::UnknownSheet(3)));
    }

    #[test]
    fn sheet_uids_survive_renames() {
        let mut wb = MemoryWorkbook::new();
        let second = wb.add_sheet("Data");
        let uid = wb.sheet_uid(second).unwrap();
        wb.rename_sheet(second, "Inputs").unwrap();
        assert_eq!(wb.sheet_uid(second).unwrap(), uid);
        assert_eq!(wb.sheet_name(second).unwrap(), "Inputs");
    }
}
