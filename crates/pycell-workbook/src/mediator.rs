//! Single entry point for sheet reads and writes.
//!
//! Reads go through [`Mediator::query`] with an explicit [`CachePolicy`];
//! writes go through [`Mediator::execute`], which applies commands
//! atomically and drops cached reads for the sheets it touched. Engine
//! events that change what a read would return are reported with
//! [`Mediator::invalidate`].

use std::any::Any;
use std::fmt;

use pycell_common::Position;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::SurfaceError;
use crate::journal::{Command, CommandLog, TracingLog, run_atomic};
use crate::surface::{AnchoredFormula, SheetSurface};

/// A pure read against the sheet.
///
/// Results are cached under `(kind, policy)`, so a cached policy must name
/// the cell or sheet the query reads.
pub trait Query {
    type Output: Clone + 'static;

    /// Stable name used in cache keys.
    fn kind(&self) -> &'static str;

    fn run(&self, surface: &dyn SheetSurface) -> Result<Self::Output, SurfaceError>;
}

/// How long a query result may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Always hit the sheet.
    Never,
    /// Reused until something invalidates this cell.
    Cell(Position),
    /// Reused until something on this sheet changes.
    Sheet(u32),
    /// Reused until anything in the document changes.
    Document,
}

/// Engine events that invalidate cached reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SourceModified(Position),
    CellMoved { from: Position, to: Position },
    CellDeleted(Position),
    /// Any write to a sheet.
    SheetChanged(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: &'static str,
    scope: CachePolicy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct Mediator {
    cache: FxHashMap<CacheKey, Box<dyn Any>>,
    log: Box<dyn CommandLog>,
    stats: CacheStats,
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("cached", &self.cache.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mediator {
    pub fn new() -> Self {
        Self::with_log(Box::new(TracingLog))
    }

    pub fn with_log(log: Box<dyn CommandLog>) -> Self {
        Self {
            cache: FxHashMap::default(),
            log,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn query<Q: Query>(
        &mut self,
        surface: &dyn SheetSurface,
        query: &Q,
        policy: CachePolicy,
    ) -> Result<Q::Output, SurfaceError> {
        if policy == CachePolicy::Never {
            return query.run(surface);
        }
        let key = CacheKey {
            kind: query.kind(),
            scope: policy,
        };
        if let Some(hit) = self.cache.get(&key).and_then(|v| v.downcast_ref::<Q::Output>()) {
            self.stats.hits += 1;
            tracing::trace!(kind = key.kind, ?policy, "cache hit");
            return Ok(hit.clone());
        }
        self.stats.misses += 1;
        let out = query.run(surface)?;
        self.cache.insert(key, Box::new(out.clone()));
        Ok(out)
    }

    /// Apply `commands` atomically. On failure every applied command is
    /// undone before the error is returned.
    pub fn execute(
        &mut self,
        surface: &mut dyn SheetSurface,
        name: &str,
        commands: Vec<Box<dyn Command>>,
    ) -> Result<usize, SurfaceError> {
        let sheets: FxHashSet<u32> = commands.iter().map(|c| c.sheet()).collect();
        let result = run_atomic(surface, self.log.as_ref(), name, commands);
        for sheet in sheets {
            self.invalidate(Trigger::SheetChanged(sheet));
        }
        result.map(|applied| applied.len())
    }

    pub fn invalidate(&mut self, trigger: Trigger) {
        let before = self.cache.len();
        let (cells, sheets): (Vec<Position>, Vec<u32>) = match trigger {
            Trigger::SourceModified(pos) | Trigger::CellDeleted(pos) => (vec![pos], vec![pos.sheet]),
            Trigger::CellMoved { from, to } => (vec![from, to], vec![from.sheet, to.sheet]),
            Trigger::SheetChanged(sheet) => (Vec::new(), vec![sheet]),
        };
        let whole_sheet = matches!(trigger, Trigger::SheetChanged(_));
        self.cache.retain(|key, _| match key.scope {
            CachePolicy::Never => false,
            CachePolicy::Document => false,
            CachePolicy::Sheet(s) => !sheets.contains(&s),
            CachePolicy::Cell(p) => {
                !(cells.contains(&p) || (whole_sheet && sheets.contains(&p.sheet)))
            }
        });
        tracing::trace!(?trigger, dropped = before - self.cache.len(), "invalidated");
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/* ───────────────────────────── queries ───────────────────────────── */

/// Formula anchored at a cell.
#[derive(Debug, Clone, Copy)]
pub struct FormulaAt(pub Position);

impl Query for FormulaAt {
    type Output = Option<AnchoredFormula>;

    fn kind(&self) -> &'static str {
        "formula"
    }

    fn run(&self, surface: &dyn SheetSurface) -> Result<Self::Output, SurfaceError> {
        surface.formula(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SheetUid(pub u32);

impl Query for SheetUid {
    type Output = String;

    fn kind(&self) -> &'static str {
        "sheet-uid"
    }

    fn run(&self, surface: &dyn SheetSurface) -> Result<Self::Output, SurfaceError> {
        surface.sheet_uid(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CodeNameAt(pub Position);

impl Query for CodeNameAt {
    type Output = Option<String>;

    fn kind(&self) -> &'static str {
        "code-name"
    }

    fn run(&self, surface: &dyn SheetSurface) -> Result<Self::Output, SurfaceError> {
        surface.code_name(self.0)
    }
}

/// Every named cell of the document.
#[derive(Debug, Clone, Copy)]
pub struct CodeNames;

impl Query for CodeNames {
    type Output = Vec<(Position, String)>;

    fn kind(&self) -> &'static str {
        "code-names"
    }

    fn run(&self, surface: &dyn SheetSurface) -> Result<Self::Output, SurfaceError> {
        surface.code_names()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SheetProtected(pub u32);

impl Query for SheetProtected {
    type Output = bool;

    fn kind(&self) -> &'static str {
        "protected"
    }

    fn run(&self, surface: &dyn SheetSurface) -> Result<Self::Output, SurfaceError> {
        surface.is_protected(self.0)
    }
}

#[cfg(test)]
mod tests {
    use pycell_common::Rect;

    use super::*;
    use crate::commands::SetFormula;
    use crate::memory::MemoryWorkbook;

    fn at(row: u32, col: u32) -> Position {
        Position::new(0, row, col)
    }

    #[test]
    fn cached_reads_hit_until_invalidated() {
        let mut wb = MemoryWorkbook::new();
        wb.set_formula(at(0, 0), Some("=A()")).unwrap();
        let mut m = Mediator::new();

        let q = FormulaAt(at(0, 0));
        let first = m.query(&wb, &q, CachePolicy::Cell(at(0, 0))).unwrap();
        wb.set_formula(at(0, 0), Some("=B()")).unwrap();
        let stale = m.query(&wb, &q, CachePolicy::Cell(at(0, 0))).unwrap();
        assert_eq!(first, stale);
        assert_eq!(m.stats(), CacheStats { hits: 1, misses: 1 });

        m.invalidate(Trigger::SourceModified(at(0, 0)));
        let fresh = m.query(&wb, &q, CachePolicy::Cell(at(0, 0))).unwrap();
        assert_eq!(fresh.unwrap().text, "=B()");
    }

    #[test]
    fn never_policy_bypasses_the_cache() {
        let wb = MemoryWorkbook::new();
        let mut m = Mediator::new();
        m.query(&wb, &SheetUid(0), CachePolicy::Never).unwrap();
        m.query(&wb, &SheetUid(0), CachePolicy::Never).unwrap();
        assert_eq!(m.cached_len(), 0);
        assert_eq!(m.stats(), CacheStats::default());
    }

    #[test]
    fn triggers_drop_the_right_scopes() {
        let wb = MemoryWorkbook::new();
        let mut m = Mediator::new();
        m.query(&wb, &FormulaAt(at(0, 0)), CachePolicy::Cell(at(0, 0))).unwrap();
        m.query(&wb, &FormulaAt(at(5, 5)), CachePolicy::Cell(at(5, 5))).unwrap();
        m.query(&wb, &SheetUid(0), CachePolicy::Sheet(0)).unwrap();
        m.query(&wb, &CodeNames, CachePolicy::Document).unwrap();
        assert_eq!(m.cached_len(), 4);

        m.invalidate(Trigger::CellMoved {
            from: at(0, 0),
            to: at(1, 0),
        });
        // The untouched cell survives; sheet and document scopes do not.
        assert_eq!(m.cached_len(), 1);
        m.invalidate(Trigger::SheetChanged(0));
        assert_eq!(m.cached_len(), 0);
    }

    #[test]
    fn execute_invalidates_touched_sheets_even_on_failure() {
        let mut wb = MemoryWorkbook::new();
        wb.set_array_formula(Rect::new(at(0, 1), 2, 1), "=X()").unwrap();
        let mut m = Mediator::new();
        m.query(&wb, &FormulaAt(at(0, 0)), CachePolicy::Cell(at(0, 0))).unwrap();

        let commands: Vec<Box<dyn Command>> = vec![
            Box::new(SetFormula::new(at(0, 0), Some("=A()".into()))),
            Box::new(SetFormula::new(at(1, 1), Some("=B()".into()))),
        ];
        assert!(m.execute(&mut wb, "two formulas", commands).is_err());
        assert_eq!(m.cached_len(), 0);
        assert_eq!(wb.formula(at(0, 0)).unwrap(), None);
    }
}
