//! Array-formula synchronization.
//!
//! Each engine cell is in one of three states: no recognized formula, a
//! plain formula, or an array formula spanning `rows x cols`. After every
//! recalculation the synchronizer compares that state with the footprint of
//! the cell's result and plans the commands that move the sheet to the new
//! state. Plans run through a journal, so a failure part way leaves the
//! sheet untouched.

use pycell_common::{BlockReason, CellValue, EngineError, Footprint, Position, Rect};

use crate::commands::{ClearArrayFormula, SetArrayFormula, SetBorder, SetCodeName, SetFormula, WriteValues};
use crate::config::SyncConfig;
use crate::formula::FormulaMatcher;
use crate::journal::Command;
use crate::mediator::{CachePolicy, CodeNameAt, FormulaAt, Mediator, SheetProtected};
use crate::surface::SheetSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaState {
    NoFormula,
    Plain,
    Array(Footprint),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FormulaState,
    pub to: FormulaState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    config: SyncConfig,
    matcher: FormulaMatcher,
}

struct Inspected {
    state: FormulaState,
    text: String,
    array: Option<Rect>,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Result<Self, EngineError> {
        let matcher = FormulaMatcher::from_config(&config)
            .map_err(|e| EngineError::collaborator("formula pattern", e))?;
        Ok(Self { config, matcher })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn matcher(&self) -> &FormulaMatcher {
        &self.matcher
    }

    fn inspect(
        &self,
        mediator: &mut Mediator,
        surface: &dyn SheetSurface,
        anchor: Position,
    ) -> Result<Inspected, EngineError> {
        let formula = mediator.query(surface, &FormulaAt(anchor), CachePolicy::Cell(anchor))?;
        Ok(match formula {
            Some(f) if self.matcher.is_recognized(&f.text) => match f.array {
                Some(rect) => Inspected {
                    state: FormulaState::Array(Footprint::new(rect.rows, rect.cols)),
                    text: f.text,
                    array: Some(rect),
                },
                None => Inspected {
                    state: FormulaState::Plain,
                    text: f.text,
                    array: None,
                },
            },
            _ => Inspected {
                state: FormulaState::NoFormula,
                text: self.matcher.build(),
                array: None,
            },
        })
    }

    pub fn state(
        &self,
        mediator: &mut Mediator,
        surface: &dyn SheetSurface,
        anchor: Position,
    ) -> Result<FormulaState, EngineError> {
        Ok(self.inspect(mediator, surface, anchor)?.state)
    }

    /// Dimensions of the array formula anchored at `anchor`, if it is one.
    pub fn current_spill(
        &self,
        mediator: &mut Mediator,
        surface: &dyn SheetSurface,
        anchor: Position,
    ) -> Result<Option<Footprint>, EngineError> {
        Ok(match self.state(mediator, surface, anchor)? {
            FormulaState::Array(size) => Some(size),
            _ => None,
        })
    }

    /// Put the engine formula and code-name on a cell that does not carry
    /// the formula yet.
    pub fn install(
        &self,
        mediator: &mut Mediator,
        surface: &mut dyn SheetSurface,
        anchor: Position,
        code_name: &str,
    ) -> Result<(), EngineError> {
        let inspected = self.inspect(mediator, surface, anchor)?;
        let mut plan: Vec<Box<dyn Command>> = Vec::new();
        if inspected.state == FormulaState::NoFormula {
            plan.push(Box::new(SetFormula::new(anchor, Some(inspected.text))));
        }
        let current = mediator.query(surface, &CodeNameAt(anchor), CachePolicy::Cell(anchor))?;
        if current.as_deref() != Some(code_name) {
            plan.push(Box::new(SetCodeName::new(anchor, Some(code_name.to_string()))));
        }
        if !plan.is_empty() {
            mediator.execute(surface, "install formula", plan)?;
        }
        Ok(())
    }

    /// Remove the engine formula, its array region, border and code-name.
    /// Foreign formulas are left alone.
    pub fn uninstall(
        &self,
        mediator: &mut Mediator,
        surface: &mut dyn SheetSurface,
        anchor: Position,
    ) -> Result<(), EngineError> {
        let inspected = self.inspect(mediator, surface, anchor)?;
        let mut plan: Vec<Box<dyn Command>> = Vec::new();
        match (inspected.state, inspected.array) {
            (FormulaState::Array(_), Some(rect)) => {
                if surface.has_border(rect)? {
                    plan.push(Box::new(SetBorder::new(rect, false)));
                }
                plan.push(Box::new(ClearArrayFormula::new(anchor)));
            }
            (FormulaState::Plain, _) => {
                plan.push(Box::new(SetFormula::new(anchor, None)));
                plan.push(Box::new(WriteValues::new(anchor, vec![vec![CellValue::Empty]])));
            }
            _ => {}
        }
        if mediator
            .query(surface, &CodeNameAt(anchor), CachePolicy::Cell(anchor))?
            .is_some()
        {
            plan.push(Box::new(SetCodeName::new(anchor, None)));
        }
        if !plan.is_empty() {
            mediator.execute(surface, "uninstall formula", plan)?;
        }
        Ok(())
    }

    /// Bring the cell at `anchor` in line with `grid`, the rendered result
    /// whose dimensions are the target footprint.
    pub fn synchronize(
        &self,
        mediator: &mut Mediator,
        surface: &mut dyn SheetSurface,
        anchor: Position,
        grid: Vec<Vec<CellValue>>,
    ) -> Result<Transition, EngineError> {
        let inspected = self.inspect(mediator, surface, anchor)?;
        let from = inspected.state;
        if from == FormulaState::NoFormula {
            tracing::debug!(%anchor, "no engine formula; nothing to synchronize");
            return Ok(Transition { from, to: from });
        }

        let target = Footprint::new(
            grid.len() as u32,
            grid.first().map_or(0, Vec::len) as u32,
        )
        .clamped();
        let to = if target.is_scalar() {
            FormulaState::Plain
        } else {
            FormulaState::Array(target)
        };
        let rect = Rect::new(anchor, target.rows, target.cols);
        let sheet = anchor.sheet;
        if mediator.query(surface, &SheetProtected(sheet), CachePolicy::Sheet(sheet))? {
            return Err(blocked(rect, BlockReason::Protected));
        }

        let mut plan: Vec<Box<dyn Command>> = Vec::new();
        match (from, to) {
            (FormulaState::Plain, FormulaState::Plain) => {}
            (FormulaState::Array(old), FormulaState::Array(new)) if old == new => {}
            (FormulaState::Plain, FormulaState::Array(_)) => {
                self.check_free(surface, rect, None)?;
                plan.push(Box::new(SetFormula::new(anchor, None)));
                plan.push(Box::new(SetArrayFormula::new(rect, inspected.text.clone())));
                if self.config.decorate_borders {
                    plan.push(Box::new(SetBorder::new(rect, true)));
                }
            }
            (FormulaState::Array(_), FormulaState::Array(_)) => {
                self.check_free(surface, rect, inspected.array)?;
                self.tear_down(surface, anchor, inspected.array, &mut plan)?;
                plan.push(Box::new(SetArrayFormula::new(rect, inspected.text.clone())));
                if self.config.decorate_borders {
                    plan.push(Box::new(SetBorder::new(rect, true)));
                }
            }
            (FormulaState::Array(_), FormulaState::Plain) => {
                self.tear_down(surface, anchor, inspected.array, &mut plan)?;
                plan.push(Box::new(SetFormula::new(anchor, Some(inspected.text.clone()))));
            }
            (_, FormulaState::NoFormula) | (FormulaState::NoFormula, _) => {}
        }
        plan.push(Box::new(WriteValues::new(anchor, grid)));

        let name = format!("sync {}", anchor.a1());
        mediator.execute(surface, &name, plan)?;
        let transition = Transition { from, to };
        if transition.changed() {
            tracing::debug!(%anchor, ?from, ?to, "array formula resized");
        }
        Ok(transition)
    }

    fn tear_down(
        &self,
        surface: &dyn SheetSurface,
        anchor: Position,
        old: Option<Rect>,
        plan: &mut Vec<Box<dyn Command>>,
    ) -> Result<(), EngineError> {
        if let Some(old) = old {
            if surface.has_border(old)? {
                plan.push(Box::new(SetBorder::new(old, false)));
            }
        }
        plan.push(Box::new(ClearArrayFormula::new(anchor)));
        Ok(())
    }

    /// Every cell of `target` other than the anchor, and other than cells
    /// already inside `keep`, must be empty and on the grid.
    fn check_free(
        &self,
        surface: &dyn SheetSurface,
        target: Rect,
        keep: Option<Rect>,
    ) -> Result<(), EngineError> {
        let (max_rows, max_cols) = surface.grid_size();
        if target.end_row() >= max_rows || target.end_col() >= max_cols {
            return Err(blocked(target, BlockReason::OutOfBounds));
        }
        for pos in target.cells() {
            if pos == target.anchor || keep.is_some_and(|k| k.contains(pos)) {
                continue;
            }
            let foreign_array = surface
                .array_owner(pos)?
                .is_some_and(|owner| owner != target.anchor);
            if foreign_array || surface.is_occupied(pos)? {
                return Err(blocked(target, BlockReason::Occupied(pos)));
            }
        }
        Ok(())
    }
}

fn blocked(target: Rect, reason: BlockReason) -> EngineError {
    let anchor = target.anchor;
    tracing::warn!(%anchor, rows = target.rows, cols = target.cols, %reason, "array update blocked");
    EngineError::ExpansionBlocked {
        anchor,
        rows: target.rows,
        cols: target.cols,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::mediator::Trigger;
    use crate::memory::MemoryWorkbook;
    use crate::surface::AnchoredFormula;

    fn at(row: u32, col: u32) -> Position {
        Position::new(0, row, col)
    }

    fn numbers(rows: u32, cols: u32) -> Vec<Vec<CellValue>> {
        (0..rows)
            .map(|r| (0..cols).map(|c| CellValue::Number(f64::from(r * 10 + c))).collect())
            .collect()
    }

    fn setup() -> (Synchronizer, Mediator, MemoryWorkbook) {
        let sync = Synchronizer::new(SyncConfig::default()).unwrap();
        let mut mediator = Mediator::new();
        let mut wb = MemoryWorkbook::new();
        sync.install(&mut mediator, &mut wb, at(0, 0), "pycell_1").unwrap();
        (sync, mediator, wb)
    }

    #[test]
    fn install_writes_formula_and_code_name() {
        let (sync, mut mediator, wb) = setup();
        assert_eq!(sync.state(&mut mediator, &wb, at(0, 0)).unwrap(), FormulaState::Plain);
        assert_eq!(wb.code_name(at(0, 0)).unwrap().as_deref(), Some("pycell_1"));
        assert_eq!(
            wb.formula(at(0, 0)).unwrap().map(|f| f.text).as_deref(),
            Some("=PY(SHEET();CELL(\"ADDRESS\"))")
        );
    }

    #[test]
    fn plain_formula_expands_into_bordered_array() {
        let (sync, mut mediator, mut wb) = setup();
        let t = sync
            .synchronize(&mut mediator, &mut wb, at(0, 0), numbers(3, 2))
            .unwrap();
        let size = Footprint::new(3, 2);
        assert_eq!(t, Transition { from: FormulaState::Plain, to: FormulaState::Array(size) });
        let rect = Rect::new(at(0, 0), 3, 2);
        assert_eq!(wb.arrays().map(|(r, _)| *r).collect::<Vec<_>>(), vec![rect]);
        assert_eq!(wb.bordered().copied().collect::<Vec<_>>(), vec![rect]);
        assert_eq!(wb.values(rect), numbers(3, 2));
        assert_eq!(sync.current_spill(&mut mediator, &wb, at(0, 0)).unwrap(), Some(size));
    }

    #[test]
    fn array_resizes_then_collapses_to_plain() {
        let (sync, mut mediator, mut wb) = setup();
        sync.synchronize(&mut mediator, &mut wb, at(0, 0), numbers(3, 2)).unwrap();

        let t = sync
            .synchronize(&mut mediator, &mut wb, at(0, 0), numbers(2, 2))
            .unwrap();
        assert_eq!(t.to, FormulaState::Array(Footprint::new(2, 2)));
        assert_eq!(wb.value(at(2, 0)).unwrap(), CellValue::Empty);
        assert_eq!(wb.bordered().copied().collect::<Vec<_>>(), vec![Rect::new(at(0, 0), 2, 2)]);

        let t = sync
            .synchronize(&mut mediator, &mut wb, at(0, 0), vec![vec![CellValue::Text("ok".into())]])
            .unwrap();
        assert_eq!(t.to, FormulaState::Plain);
        assert_eq!(wb.arrays().count(), 0);
        assert_eq!(wb.bordered().count(), 0);
        assert_eq!(wb.value(at(0, 0)).unwrap(), CellValue::Text("ok".into()));
        assert_eq!(wb.value(at(1, 1)).unwrap(), CellValue::Empty);
        assert!(sync.matcher().is_recognized(&wb.formula(at(0, 0)).unwrap().unwrap().text));
    }

    #[test]
    fn same_size_only_rewrites_values() {
        let (sync, mut mediator, mut wb) = setup();
        sync.synchronize(&mut mediator, &mut wb, at(0, 0), numbers(2, 2)).unwrap();
        let mut grid = numbers(2, 2);
        grid[1][1] = CellValue::Boolean(true);
        let t = sync.synchronize(&mut mediator, &mut wb, at(0, 0), grid).unwrap();
        assert!(!t.changed());
        assert_eq!(wb.value(at(1, 1)).unwrap(), CellValue::Boolean(true));
    }

    #[test]
    fn occupied_cell_blocks_expansion() {
        let (sync, mut mediator, mut wb) = setup();
        wb.set_value(at(1, 0), CellValue::Text("mine".into())).unwrap();
        let err = sync
            .synchronize(&mut mediator, &mut wb, at(0, 0), numbers(2, 1))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::ExpansionBlocked {
                anchor: at(0, 0),
                rows: 2,
                cols: 1,
                reason: BlockReason::Occupied(at(1, 0)),
            }
        );
        assert_eq!(sync.state(&mut mediator, &wb, at(0, 0)).unwrap(), FormulaState::Plain);
        assert_eq!(wb.value(at(1, 0)).unwrap(), CellValue::Text("mine".into()));
        assert_eq!(wb.arrays().count(), 0);
    }

    #[test]
    fn growing_array_only_checks_new_cells() {
        let (sync, mut mediator, mut wb) = setup();
        sync.synchronize(&mut mediator, &mut wb, at(0, 0), numbers(2, 2)).unwrap();
        wb.set_value(at(3, 0), CellValue::Number(1.0)).unwrap();
        sync.synchronize(&mut mediator, &mut wb, at(0, 0), numbers(3, 2)).unwrap();
        let err = sync
            .synchronize(&mut mediator, &mut wb, at(0, 0), numbers(4, 2))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExpansionBlocked { reason: BlockReason::Occupied(p), .. } if p == at(3, 0)
        ));
        assert_eq!(sync.current_spill(&mut mediator, &wb, at(0, 0)).unwrap(), Some(Footprint::new(3, 2)));
    }

    #[test]
    fn protection_and_bounds_block_expansion() {
        let sync = Synchronizer::new(SyncConfig::default()).unwrap();
        let mut mediator = Mediator::new();
        let mut wb = MemoryWorkbook::new().with_grid(4, 4);
        sync.install(&mut mediator, &mut wb, at(2, 0), "pycell_1").unwrap();
        let err = sync
            .synchronize(&mut mediator, &mut wb, at(2, 0), numbers(3, 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::ExpansionBlocked { reason: BlockReason::OutOfBounds, .. }));

        wb.protect(0, true).unwrap();
        mediator.invalidate(Trigger::SheetChanged(0));
        let err = sync
            .synchronize(&mut mediator, &mut wb, at(2, 0), numbers(2, 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::ExpansionBlocked { reason: BlockReason::Protected, .. }));
    }

    #[test]
    fn protected_sheet_blocks_collapse_and_value_writes() {
        let (sync, mut mediator, mut wb) = setup();
        sync.synchronize(&mut mediator, &mut wb, at(0, 0), numbers(2, 2)).unwrap();
        wb.protect(0, true).unwrap();
        mediator.invalidate(Trigger::SheetChanged(0));

        for grid in [numbers(1, 1), numbers(2, 2)] {
            let err = sync
                .synchronize(&mut mediator, &mut wb, at(0, 0), grid)
                .unwrap_err();
            assert!(matches!(err, EngineError::ExpansionBlocked { reason: BlockReason::Protected, .. }));
        }
        assert_eq!(
            sync.state(&mut mediator, &wb, at(0, 0)).unwrap(),
            FormulaState::Array(Footprint::new(2, 2))
        );
        assert_eq!(wb.bordered().count(), 1);
    }

    #[test]
    fn foreign_and_missing_formulas_are_ignored() {
        let sync = Synchronizer::new(SyncConfig::default()).unwrap();
        let mut mediator = Mediator::new();
        let mut wb = MemoryWorkbook::new();
        wb.set_formula(at(0, 0), Some("=SUM(B1:B3)")).unwrap();
        for anchor in [at(0, 0), at(5, 5)] {
            let t = sync
                .synchronize(&mut mediator, &mut wb, anchor, numbers(2, 2))
                .unwrap();
            assert_eq!(t.to, FormulaState::NoFormula);
        }
        assert_eq!(wb.arrays().count(), 0);
        assert_eq!(wb.value(at(1, 1)).unwrap(), CellValue::Empty);
    }

    #[test]
    fn uninstall_clears_array_border_and_code_name() {
        let (sync, mut mediator, mut wb) = setup();
        sync.synchronize(&mut mediator, &mut wb, at(0, 0), numbers(2, 3)).unwrap();
        sync.uninstall(&mut mediator, &mut wb, at(0, 0)).unwrap();
        assert_eq!(wb.arrays().count(), 0);
        assert_eq!(wb.bordered().count(), 0);
        assert_eq!(wb.formula(at(0, 0)).unwrap(), None);
        assert_eq!(wb.code_name(at(0, 0)).unwrap(), None);
        assert!(wb.code_names().unwrap().is_empty());
    }

    /// Surface whose border calls always fail.
    struct NoBorders(MemoryWorkbook);

    impl SheetSurface for NoBorders {
        fn sheet_count(&self) -> u32 {
            self.0.sheet_count()
        }
        fn sheet_name(&self, sheet: u32) -> Result<String, SurfaceError> {
            self.0.sheet_name(sheet)
        }
        fn sheet_uid(&self, sheet: u32) -> Result<String, SurfaceError> {
            self.0.sheet_uid(sheet)
        }
        fn grid_size(&self) -> (u32, u32) {
            self.0.grid_size()
        }
        fn is_protected(&self, sheet: u32) -> Result<bool, SurfaceError> {
            self.0.is_protected(sheet)
        }
        fn formula(&self, pos: Position) -> Result<Option<AnchoredFormula>, SurfaceError> {
            self.0.formula(pos)
        }
        fn array_owner(&self, pos: Position) -> Result<Option<Position>, SurfaceError> {
            self.0.array_owner(pos)
        }
        fn value(&self, pos: Position) -> Result<CellValue, SurfaceError> {
            self.0.value(pos)
        }
        fn set_formula(&mut self, pos: Position, text: Option<&str>) -> Result<(), SurfaceError> {
            self.0.set_formula(pos, text)
        }
        fn set_array_formula(&mut self, rect: Rect, text: &str) -> Result<(), SurfaceError> {
            self.0.set_array_formula(rect, text)
        }
        fn clear_array_formula(&mut self, anchor: Position) -> Result<(), SurfaceError> {
            self.0.clear_array_formula(anchor)
        }
        fn set_value(&mut self, pos: Position, value: CellValue) -> Result<(), SurfaceError> {
            self.0.set_value(pos, value)
        }
        fn has_border(&self, rect: Rect) -> Result<bool, SurfaceError> {
            self.0.has_border(rect)
        }
        fn set_border(&mut self, _rect: Rect, _on: bool) -> Result<(), SurfaceError> {
            Err(SurfaceError::host("borders unavailable"))
        }
        fn code_name(&self, pos: Position) -> Result<Option<String>, SurfaceError> {
            self.0.code_name(pos)
        }
        fn set_code_name(&mut self, pos: Position, name: Option<&str>) -> Result<(), SurfaceError> {
            self.0.set_code_name(pos, name)
        }
        fn code_names(&self) -> Result<Vec<(Position, String)>, SurfaceError> {
            self.0.code_names()
        }
    }

    #[test]
    fn failed_step_rolls_back_whole_transition() {
        let (sync, mut mediator, wb) = setup();
        let mut surface = NoBorders(wb);
        let err = sync
            .synchronize(&mut mediator, &mut surface, at(0, 0), numbers(2, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::CollaboratorQuery { .. }));
        assert_eq!(surface.0.arrays().count(), 0);
        assert_eq!(sync.state(&mut mediator, &surface, at(0, 0)).unwrap(), FormulaState::Plain);

        let plain = Synchronizer::new(SyncConfig::default().with_borders(false)).unwrap();
        plain
            .synchronize(&mut mediator, &mut surface, at(0, 0), numbers(2, 2))
            .unwrap();
        assert_eq!(surface.0.arrays().count(), 1);
    }
}
