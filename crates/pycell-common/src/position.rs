//! Document-wide cell positions and rectangular regions.
//!
//! A [`Position`] orders fragments across the whole document: sheet index
//! first, then row, then column. All indices are zero-based; A1 rendering
//! adds the usual one-based offsets.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thiserror::Error;

/// Errors returned while parsing A1-style addresses.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address '{0}' has no column letters")]
    MissingColumn(String),
    #[error("address '{0}' has no row number")]
    MissingRow(String),
    #[error("row 0 is not valid in '{0}'")]
    ZeroRow(String),
    #[error("address '{0}' is malformed")]
    Malformed(String),
}

/// Zero-based (sheet, row, column) triple.
///
/// The derived ordering compares fields in declaration order, which is the
/// global execution order of fragments.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub sheet: u32,
    pub row: u32,
    pub col: u32,
}

impl Position {
    pub const fn new(sheet: u32, row: u32, col: u32) -> Self {
        Self { sheet, row, col }
    }

    /// Parse `B3` or `$B$3` on the given sheet.
    pub fn from_a1(sheet: u32, a1: &str) -> Result<Self, AddressError> {
        let (row, col) = parse_a1(a1)?;
        Ok(Self::new(sheet, row, col))
    }

    /// Absolute A1 form, as returned by `CELL("ADDRESS")`.
    pub fn a1_absolute(&self) -> String {
        format!("${}${}", column_to_letters(self.col), self.row + 1)
    }

    /// Relative A1 form (`B3`).
    pub fn a1(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row + 1)
    }

    pub fn offset(&self, rows: u32, cols: u32) -> Self {
        Self::new(self.sheet, self.row + rows, self.col + cols)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}!{}", self.sheet, self.a1())
    }
}

/// Rectangle anchored at its top-left cell.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Rect {
    pub anchor: Position,
    pub rows: u32,
    pub cols: u32,
}

impl Rect {
    pub const fn new(anchor: Position, rows: u32, cols: u32) -> Self {
        Self { anchor, rows, cols }
    }

    pub const fn single(anchor: Position) -> Self {
        Self::new(anchor, 1, 1)
    }

    pub fn end_row(&self) -> u32 {
        self.anchor.row + self.rows.saturating_sub(1)
    }

    pub fn end_col(&self) -> u32 {
        self.anchor.col + self.cols.saturating_sub(1)
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.sheet == self.anchor.sheet
            && pos.row >= self.anchor.row
            && pos.row <= self.end_row()
            && pos.col >= self.anchor.col
            && pos.col <= self.end_col()
    }

    /// Row-major iteration over every cell of the rectangle.
    pub fn cells(&self) -> impl Iterator<Item = Position> + '_ {
        let anchor = self.anchor;
        let cols = self.cols;
        (0..self.rows).flat_map(move |r| (0..cols).map(move |c| anchor.offset(r, c)))
    }

    /// `$A$1:$C$4` style text.
    pub fn a1_absolute(&self) -> String {
        let end = Position::new(self.anchor.sheet, self.end_row(), self.end_col());
        if self.rows <= 1 && self.cols <= 1 {
            self.anchor.a1_absolute()
        } else {
            format!("{}:{}", self.anchor.a1_absolute(), end.a1_absolute())
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}!{}", self.anchor.sheet, self.a1_absolute())
    }
}

/// Parse `B3`/`$B$3` into zero-based (row, col).
pub fn parse_a1(a1: &str) -> Result<(u32, u32), AddressError> {
    let text = a1.trim();
    if text.is_empty() {
        return Err(AddressError::Empty);
    }
    let cleaned: String = text.chars().filter(|c| *c != '$').collect();
    let split = cleaned
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| AddressError::MissingRow(a1.to_string()))?;
    let (letters, digits) = cleaned.split_at(split);
    if letters.is_empty() {
        return Err(AddressError::MissingColumn(a1.to_string()));
    }
    let col = letters_to_column_index(&letters.to_ascii_uppercase())
        .ok_or_else(|| AddressError::Malformed(a1.to_string()))?;
    let row: u32 = digits
        .parse()
        .map_err(|_| AddressError::Malformed(a1.to_string()))?;
    if row == 0 {
        return Err(AddressError::ZeroRow(a1.to_string()));
    }
    Ok((row - 1, col))
}

pub fn column_to_letters(mut col: u32) -> String {
    let mut buf = Vec::new();
    loop {
        buf.push(char::from(b'A' + (col % 26) as u8));
        col /= 26;
        if col == 0 {
            break;
        }
        col -= 1;
    }
    buf.iter().rev().collect()
}

fn letters_to_column_index(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for (idx, ch) in s.bytes().enumerate() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        col = col.checked_mul(26)?.checked_add((ch - b'A') as u32)?;
        if idx != s.len() - 1 {
            col = col.checked_add(1)?;
        }
    }
    Some(col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_sheet_then_row_then_col() {
        let a = Position::new(0, 5, 9);
        let b = Position::new(1, 0, 0);
        let c = Position::new(0, 6, 0);
        let d = Position::new(0, 5, 10);
        assert!(a < b);
        assert!(a < c);
        assert!(a < d);
        assert!(c < b);
    }

    #[test]
    fn a1_rendering() {
        let p = Position::new(0, 2, 27);
        assert_eq!(p.a1(), "AB3");
        assert_eq!(p.a1_absolute(), "$AB$3");
        assert_eq!(Position::from_a1(0, "$AB$3").unwrap(), p);
        assert_eq!(Position::from_a1(2, "a1").unwrap(), Position::new(2, 0, 0));
    }

    #[test]
    fn a1_errors() {
        assert_eq!(parse_a1(""), Err(AddressError::Empty));
        assert!(matches!(parse_a1("A0"), Err(AddressError::ZeroRow(_))));
        assert!(matches!(parse_a1("12"), Err(AddressError::MissingColumn(_))));
        assert!(matches!(parse_a1("AB"), Err(AddressError::MissingRow(_))));
    }

    #[test]
    fn rect_cells_and_bounds() {
        let r = Rect::new(Position::new(0, 1, 1), 2, 3);
        let cells: Vec<_> = r.cells().collect();
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], Position::new(0, 1, 1));
        assert_eq!(cells[5], Position::new(0, 2, 3));
        assert!(r.contains(Position::new(0, 2, 3)));
        assert!(!r.contains(Position::new(0, 3, 3)));
        assert!(!r.contains(Position::new(1, 1, 1)));
        assert_eq!(r.a1_absolute(), "$B$2:$D$3");
    }
}
