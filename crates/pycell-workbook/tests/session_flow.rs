//! End-to-end flows through `Session` against the in-memory workbook.

use pycell_common::{BlockReason, CellValue, EngineError, Position, Rect};
use pycell_eval::{DocumentId, MemoryStore};
use pycell_workbook::{
    AnchoredFormula, FormulaState, MemoryWorkbook, Session, SessionConfig, SheetSurface,
    SurfaceError,
};

fn at(row: u32, col: u32) -> Position {
    Position::new(0, row, col)
}

fn num(n: f64) -> CellValue {
    CellValue::Number(n)
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn open() -> (Session, MemoryWorkbook, DocumentId) {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    let wb = MemoryWorkbook::new();
    let doc = DocumentId::from("book");
    session
        .open_document(doc.clone(), Box::new(MemoryStore::new()), &wb)
        .unwrap();
    (session, wb, doc)
}

#[test]
fn dependent_cells_follow_edits_and_removal() {
    let (mut session, mut wb, doc) = open();

    let first = session.set_source(&doc, &mut wb, at(0, 0), "x = 42").unwrap();
    let second = session.set_source(&doc, &mut wb, at(1, 0), "y = x + 10").unwrap();
    assert_eq!(first, "pycell_1");
    assert_eq!(second, "pycell_2");
    assert_eq!(wb.code_name(at(1, 0)).unwrap().as_deref(), Some("pycell_2"));

    assert_eq!(session.recalculate(&doc, &mut wb, at(0, 0)).unwrap(), vec![vec![num(42.0)]]);
    assert_eq!(session.recalculate(&doc, &mut wb, at(1, 0)).unwrap(), vec![vec![num(52.0)]]);

    assert_eq!(session.set_source(&doc, &mut wb, at(0, 0), "x = 100").unwrap(), "pycell_1");
    let results = session.recalculate_all(&doc, &mut wb).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(wb.value(at(1, 0)).unwrap(), num(110.0));

    session.delete_source(&doc, &mut wb, at(0, 0)).unwrap();
    assert_eq!(wb.formula(at(0, 0)).unwrap(), None);
    assert_eq!(wb.code_name(at(0, 0)).unwrap(), None);
    let grid = session.recalculate(&doc, &mut wb, at(1, 0)).unwrap();
    assert_eq!(grid, vec![vec![CellValue::Error(
        "#PY! NameError: name 'x' is not defined".into()
    )]]);
}

#[test]
fn frame_spills_and_collapses_back() {
    let (mut session, mut wb, doc) = open();
    let anchor = at(0, 2);
    session
        .set_source(
            &doc,
            &mut wb,
            anchor,
            "import pandas as pd\ndf = pd.DataFrame({'a': [1, 2, 3], 'b': [4, 5, 6]})\ndf.display(index=False)",
        )
        .unwrap();
    let grid = session.recalculate(&doc, &mut wb, anchor).unwrap();
    assert_eq!(grid.len(), 4);
    assert_eq!(grid[0], vec![text("a"), text("b")]);
    assert_eq!(grid[3], vec![num(3.0), num(6.0)]);

    let rect = Rect::new(anchor, 4, 2);
    assert_eq!(wb.values(rect), grid);
    assert_eq!(wb.arrays().map(|(r, _)| *r).collect::<Vec<_>>(), vec![rect]);
    assert_eq!(
        session.synchronizer().state(&mut pycell_workbook::Mediator::new(), &wb, anchor).unwrap(),
        FormulaState::Array(pycell_common::Footprint::new(4, 2))
    );

    session.set_source(&doc, &mut wb, anchor, "total = 21\ntotal").unwrap();
    let grid = session.recalculate(&doc, &mut wb, anchor).unwrap();
    assert_eq!(grid, vec![vec![num(21.0)]]);
    assert_eq!(wb.arrays().count(), 0);
    assert_eq!(wb.bordered().count(), 0);
    assert_eq!(wb.value(at(3, 3)).unwrap(), CellValue::Empty);
}

#[test]
fn blocked_spill_reports_and_keeps_the_sheet() {
    let (mut session, mut wb, doc) = open();
    wb.set_value(at(2, 0), text("keep me")).unwrap();
    session
        .set_source(&doc, &mut wb, at(0, 0), "rows = [[1, 2], [3, 4], [5, 6]]\nrows")
        .unwrap();
    let err = session.recalculate(&doc, &mut wb, at(0, 0)).unwrap_err();
    assert_eq!(
        err,
        EngineError::ExpansionBlocked {
            anchor: at(0, 0),
            rows: 3,
            cols: 2,
            reason: BlockReason::Occupied(at(2, 0)),
        }
    );
    assert_eq!(wb.value(at(2, 0)).unwrap(), text("keep me"));
    assert_eq!(wb.arrays().count(), 0);
    assert_eq!(wb.value(at(0, 1)).unwrap(), CellValue::Empty);

    wb.set_value(at(2, 0), CellValue::Empty).unwrap();
    session.recalculate(&doc, &mut wb, at(0, 0)).unwrap();
    assert_eq!(wb.value(at(2, 1)).unwrap(), num(6.0));
}

#[test]
fn moved_cells_keep_their_state() {
    let (mut session, mut wb, doc) = open();
    session.set_source(&doc, &mut wb, at(0, 0), "a = 7").unwrap();
    let executions = session.document(&doc).unwrap().manager().executions();

    session.move_cell(&doc, at(0, 0), at(4, 1)).unwrap();
    let manager = session.document(&doc).unwrap().manager();
    assert_eq!(manager.executions(), executions);
    assert_eq!(manager.fragment(at(4, 1)).map(|f| f.code_name.as_str()), Some("pycell_1"));
    assert_eq!(session.value(&doc, at(4, 1)).unwrap(), Some(pycell_common::Value::Int(7)));
    assert!(matches!(
        session.recalculate(&doc, &mut wb, at(0, 0)),
        Err(EngineError::FragmentMissing(_))
    ));
}

#[test]
fn reset_and_dump_module() {
    let (mut session, mut wb, doc) = open();
    session.set_source(&doc, &mut wb, at(0, 0), "n = 1").unwrap();
    session.set_source(&doc, &mut wb, at(1, 0), "n = n + 1").unwrap();
    assert_eq!(session.dump_module(&doc, at(1, 0), false).unwrap(), "n = 1");
    assert_eq!(session.dump_module(&doc, at(1, 0), true).unwrap(), "n = 1\nn = n + 1");

    session.reset_document(&doc).unwrap();
    assert_eq!(session.value(&doc, at(1, 0)).unwrap(), Some(pycell_common::Value::Int(2)));
}

#[test]
fn unknown_documents_are_rejected() {
    let (mut session, mut wb, doc) = open();
    let other = DocumentId::from("missing");
    assert!(matches!(
        session.set_source(&other, &mut wb, at(0, 0), "x = 1"),
        Err(EngineError::UnknownDocument(_))
    ));
    assert!(session.close_document(&doc));
    assert!(!session.is_open(&doc));
    assert!(session.cache_stats(&doc).is_err());
}

/// Workbook that refuses every write once frozen.
struct Frozen {
    wb: MemoryWorkbook,
    frozen: bool,
}

impl Frozen {
    fn write(&self) -> Result<(), SurfaceError> {
        if self.frozen {
            Err(SurfaceError::host("workbook is read-only"))
        } else {
            Ok(())
        }
    }
}

impl SheetSurface for Frozen {
    fn sheet_count(&self) -> u32 {
        self.wb.sheet_count()
    }
    fn sheet_name(&self, sheet: u32) -> Result<String, SurfaceError> {
        self.wb.sheet_name(sheet)
    }
    fn sheet_uid(&self, sheet: u32) -> Result<String, SurfaceError> {
        self.wb.sheet_uid(sheet)
    }
    fn grid_size(&self) -> (u32, u32) {
        self.wb.grid_size()
    }
    fn is_protected(&self, sheet: u32) -> Result<bool, SurfaceError> {
        self.wb.is_protected(sheet)
    }
    fn formula(&self, pos: Position) -> Result<Option<AnchoredFormula>, SurfaceError> {
        self.wb.formula(pos)
    }
    fn array_owner(&self, pos: Position) -> Result<Option<Position>, SurfaceError> {
        self.wb.array_owner(pos)
    }
    fn value(&self, pos: Position) -> Result<CellValue, SurfaceError> {
        self.wb.value(pos)
    }
    fn set_formula(&mut self, pos: Position, text: Option<&str>) -> Result<(), SurfaceError> {
        self.write()?;
        self.wb.set_formula(pos, text)
    }
    fn set_array_formula(&mut self, rect: Rect, text: &str) -> Result<(), SurfaceError> {
        self.write()?;
        self.wb.set_array_formula(rect, text)
    }
    fn clear_array_formula(&mut self, anchor: Position) -> Result<(), SurfaceError> {
        self.write()?;
        self.wb.clear_array_formula(anchor)
    }
    fn set_value(&mut self, pos: Position, value: CellValue) -> Result<(), SurfaceError> {
        self.write()?;
        self.wb.set_value(pos, value)
    }
    fn has_border(&self, rect: Rect) -> Result<bool, SurfaceError> {
        self.wb.has_border(rect)
    }
    fn set_border(&mut self, rect: Rect, on: bool) -> Result<(), SurfaceError> {
        self.write()?;
        self.wb.set_border(rect, on)
    }
    fn code_name(&self, pos: Position) -> Result<Option<String>, SurfaceError> {
        self.wb.code_name(pos)
    }
    fn set_code_name(&mut self, pos: Position, name: Option<&str>) -> Result<(), SurfaceError> {
        self.write()?;
        self.wb.set_code_name(pos, name)
    }
    fn code_names(&self) -> Result<Vec<(Position, String)>, SurfaceError> {
        self.wb.code_names()
    }
}

#[test]
fn failed_delete_keeps_cell_and_fragment() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    let mut surface = Frozen {
        wb: MemoryWorkbook::new(),
        frozen: false,
    };
    let doc = DocumentId::from("book");
    session
        .open_document(doc.clone(), Box::new(MemoryStore::new()), &surface)
        .unwrap();
    session.set_source(&doc, &mut surface, at(0, 0), "x = 5\nx * 2").unwrap();
    session.recalculate(&doc, &mut surface, at(0, 0)).unwrap();

    surface.frozen = true;
    let err = session.delete_source(&doc, &mut surface, at(0, 0)).unwrap_err();
    assert!(matches!(err, EngineError::CollaboratorQuery { .. }));

    let fragment = session.document(&doc).unwrap().manager().fragment(at(0, 0)).cloned();
    assert_eq!(fragment.map(|f| f.source), Some("x = 5\nx * 2".to_string()));
    assert!(surface.wb.formula(at(0, 0)).unwrap().is_some());
    assert_eq!(surface.wb.code_name(at(0, 0)).unwrap().as_deref(), Some("pycell_1"));
    assert_eq!(session.value(&doc, at(0, 0)).unwrap(), Some(pycell_common::Value::Int(10)));

    surface.frozen = false;
    session.delete_source(&doc, &mut surface, at(0, 0)).unwrap();
    assert!(session.document(&doc).unwrap().manager().is_empty());
    assert_eq!(surface.wb.formula(at(0, 0)).unwrap(), None);
}
