//! Reversible sheet mutations used by the synchronizer and the session.

use pycell_common::{CellValue, Position, Rect};

use crate::error::SurfaceError;
use crate::journal::Command;
use crate::surface::SheetSurface;

fn plain_formula(surface: &dyn SheetSurface, pos: Position) -> Result<Option<String>, SurfaceError> {
    Ok(surface
        .formula(pos)?
        .filter(|f| f.array.is_none())
        .map(|f| f.text))
}

fn read_values(surface: &dyn SheetSurface, rect: Rect) -> Result<Vec<Vec<CellValue>>, SurfaceError> {
    (0..rect.rows)
        .map(|r| {
            (0..rect.cols)
                .map(|c| surface.value(rect.anchor.offset(r, c)))
                .collect()
        })
        .collect()
}

fn write_values(
    surface: &mut dyn SheetSurface,
    anchor: Position,
    grid: &[Vec<CellValue>],
) -> Result<(), SurfaceError> {
    for (r, row) in grid.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            surface.set_value(anchor.offset(r as u32, c as u32), value.clone())?;
        }
    }
    Ok(())
}

/// Set or clear the plain formula of one cell.
#[derive(Debug)]
pub struct SetFormula {
    pos: Position,
    text: Option<String>,
    prior: Option<String>,
}

impl SetFormula {
    pub fn new(pos: Position, text: Option<String>) -> Self {
        Self {
            pos,
            text,
            prior: None,
        }
    }
}

impl Command for SetFormula {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        self.prior = plain_formula(surface, self.pos)?;
        surface.set_formula(self.pos, self.text.as_deref())
    }

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        surface.set_formula(self.pos, self.prior.as_deref())
    }

    fn describe(&self) -> String {
        match &self.text {
            Some(text) => format!("set formula {} = {text}", self.pos.a1()),
            None => format!("clear formula {}", self.pos.a1()),
        }
    }

    fn sheet(&self) -> u32 {
        self.pos.sheet
    }
}

/// Enter an array formula over a rectangle. The anchor's plain formula, if
/// any, is replaced and restored on undo.
#[derive(Debug)]
pub struct SetArrayFormula {
    rect: Rect,
    text: String,
    prior_plain: Option<String>,
}

impl SetArrayFormula {
    pub fn new(rect: Rect, text: impl Into<String>) -> Self {
        Self {
            rect,
            text: text.into(),
            prior_plain: None,
        }
    }
}

impl Command for SetArrayFormula {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        self.prior_plain = plain_formula(surface, self.rect.anchor)?;
        surface.set_array_formula(self.rect, &self.text)
    }

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        surface.clear_array_formula(self.rect.anchor)?;
        if let Some(text) = &self.prior_plain {
            surface.set_formula(self.rect.anchor, Some(text))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("set array formula {}", self.rect.a1_absolute())
    }

    fn sheet(&self) -> u32 {
        self.rect.anchor.sheet
    }
}

/// Remove the array formula anchored at a cell together with the values it
/// displayed.
#[derive(Debug)]
pub struct ClearArrayFormula {
    anchor: Position,
    prior: Option<(Rect, String, Vec<Vec<CellValue>>)>,
}

impl ClearArrayFormula {
    pub fn new(anchor: Position) -> Self {
        Self {
            anchor,
            prior: None,
        }
    }
}

impl Command for ClearArrayFormula {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        let formula = surface
            .formula(self.anchor)?
            .ok_or(SurfaceError::NoArray(self.anchor))?;
        let rect = formula.array.ok_or(SurfaceError::NoArray(self.anchor))?;
        let values = read_values(surface, rect)?;
        surface.clear_array_formula(self.anchor)?;
        self.prior = Some((rect, formula.text, values));
        Ok(())
    }

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        if let Some((rect, text, values)) = &self.prior {
            surface.set_array_formula(*rect, text)?;
            write_values(surface, rect.anchor, values)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("clear array formula at {}", self.anchor.a1())
    }

    fn sheet(&self) -> u32 {
        self.anchor.sheet
    }
}

/// Write a grid of values starting at an anchor.
#[derive(Debug)]
pub struct WriteValues {
    anchor: Position,
    grid: Vec<Vec<CellValue>>,
    prior: Vec<Vec<CellValue>>,
}

impl WriteValues {
    pub fn new(anchor: Position, grid: Vec<Vec<CellValue>>) -> Self {
        Self {
            anchor,
            grid,
            prior: Vec::new(),
        }
    }

    fn rect(&self) -> Rect {
        let rows = self.grid.len() as u32;
        let cols = self.grid.first().map_or(0, Vec::len) as u32;
        Rect::new(self.anchor, rows, cols)
    }
}

impl Command for WriteValues {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        self.prior = read_values(surface, self.rect())?;
        write_values(surface, self.anchor, &self.grid)
    }

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        write_values(surface, self.anchor, &self.prior)
    }

    fn describe(&self) -> String {
        format!("write values {}", self.rect().a1_absolute())
    }

    fn sheet(&self) -> u32 {
        self.anchor.sheet
    }
}

/// Add or remove the outline border of a rectangle.
#[derive(Debug)]
pub struct SetBorder {
    rect: Rect,
    on: bool,
    prior: bool,
}

impl SetBorder {
    pub fn new(rect: Rect, on: bool) -> Self {
        Self {
            rect,
            on,
            prior: false,
        }
    }
}

impl Command for SetBorder {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        self.prior = surface.has_border(self.rect)?;
        surface.set_border(self.rect, self.on)
    }

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        surface.set_border(self.rect, self.prior)
    }

    fn describe(&self) -> String {
        let verb = if self.on { "add" } else { "remove" };
        format!("{verb} border {}", self.rect.a1_absolute())
    }

    fn sheet(&self) -> u32 {
        self.rect.anchor.sheet
    }
}

/// Attach or detach a cell's code-name property.
#[derive(Debug)]
pub struct SetCodeName {
    pos: Position,
    name: Option<String>,
    prior: Option<String>,
}

impl SetCodeName {
    pub fn new(pos: Position, name: Option<String>) -> Self {
        Self {
            pos,
            name,
            prior: None,
        }
    }
}

impl Command for SetCodeName {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        self.prior = surface.code_name(self.pos)?;
        surface.set_code_name(self.pos, self.name.as_deref())
    }

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        surface.set_code_name(self.pos, self.prior.as_deref())
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("name {} {name}", self.pos.a1()),
            None => format!("unname {}", self.pos.a1()),
        }
    }

    fn sheet(&self) -> u32 {
        self.pos.sheet
    }
}
