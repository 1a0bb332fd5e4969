#![cfg(feature = "workbook")]

use pycell::{CellValue, DocumentId, MemoryStore, MemoryWorkbook, Position, Session, SessionConfig};

#[test]
fn quickstart_through_the_facade() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    let mut sheet = MemoryWorkbook::new();
    let doc = DocumentId::from("quickstart");
    session
        .open_document(doc.clone(), Box::new(MemoryStore::new()), &sheet)
        .unwrap();

    let a1 = Position::new(0, 0, 0);
    let b1 = Position::new(0, 0, 1);
    session.set_source(&doc, &mut sheet, a1, "prices = [3, 4, 5]").unwrap();
    session
        .set_source(&doc, &mut sheet, b1, "[[p, p * 2] for p in prices]")
        .unwrap();

    let grid = session.recalculate(&doc, &mut sheet, b1).unwrap();
    assert_eq!(grid.len(), 3);
    assert_eq!(grid[2], vec![CellValue::Number(5.0), CellValue::Number(10.0)]);
}
