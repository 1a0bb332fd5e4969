use std::rc::Rc;

use pycell_common::{EngineError, Position, ResultKind, Value};

use super::common::*;
use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::manager::SourceManager;
use crate::store::FsStore;

fn three_fragments() -> SourceManager {
    let mut mgr = manager();
    add(&mut mgr, a(0), "x = 1");
    add(&mut mgr, a(1), "y = x * 2");
    add(&mut mgr, a(2), "z = y + x");
    mgr
}

#[test]
fn appending_executes_only_the_new_fragment() {
    let mut mgr = three_fragments();
    assert_eq!(mgr.executions(), 3);
    let before: Vec<_> = mgr.history().iter().cloned().collect();

    add(&mut mgr, a(3), "w = z * 10");
    assert_eq!(mgr.executions(), 4);
    assert_eq!(int_at(&mgr, a(3)), Some(30));
    for (pos, item) in [a(0), a(1), a(2)].into_iter().zip(&before) {
        assert!(Rc::ptr_eq(mgr.state(pos).unwrap(), item));
    }
}

#[test]
fn editing_the_last_fragment_keeps_earlier_state_items() {
    let mut mgr = three_fragments();
    let first = Rc::clone(mgr.state(a(0)).unwrap());
    let second = Rc::clone(mgr.state(a(1)).unwrap());
    let third = Rc::clone(mgr.state(a(2)).unwrap());

    mgr.update_source("z = y - x", a(2)).unwrap();
    assert_eq!(mgr.executions(), 4);
    assert!(Rc::ptr_eq(mgr.state(a(0)).unwrap(), &first));
    assert!(Rc::ptr_eq(mgr.state(a(1)).unwrap(), &second));
    assert!(!Rc::ptr_eq(mgr.state(a(2)).unwrap(), &third));
    assert_eq!(int_at(&mgr, a(2)), Some(1));
}

#[test]
fn editing_a_middle_fragment_replaces_every_state_item() {
    let mut mgr = three_fragments();
    let before: Vec<_> = mgr.history().iter().cloned().collect();

    mgr.update_source("y = x * 5", a(1)).unwrap();
    assert_eq!(mgr.executions(), 6);
    for (pos, old) in [a(0), a(1), a(2)].into_iter().zip(&before) {
        assert!(!Rc::ptr_eq(mgr.state(pos).unwrap(), old));
    }
    assert_eq!(int_at(&mgr, a(2)), Some(6));
}

#[test]
fn tail_edit_does_not_see_its_own_previous_bindings() {
    let mut mgr = manager();
    add(&mut mgr, a(0), "base = 1");
    add(&mut mgr, a(1), "tmp = 99\nout = base");
    mgr.update_source("out = base + 1", a(1)).unwrap();
    assert!(!mgr.namespace().contains("tmp"));
    assert_eq!(int_at(&mgr, a(1)), Some(2));
}

#[test]
fn update_all_is_idempotent() {
    let mut mgr = three_fragments();
    add(&mut mgr, a(3), "import pandas as pd\npd.DataFrame({'v': [x, y, z]})");
    let classifier = Classifier::new();

    mgr.update_all();
    let first: Vec<_> = mgr
        .positions()
        .into_iter()
        .map(|p| mgr.classify(p, &classifier))
        .collect();
    let ns = mgr.namespace().clone();

    mgr.update_all();
    let second: Vec<_> = mgr
        .positions()
        .into_iter()
        .map(|p| mgr.classify(p, &classifier))
        .collect();
    assert_eq!(first, second);
    assert_eq!(&ns, mgr.namespace());
    assert_eq!(first[3].as_ref().map(|c| c.kind), Some(ResultKind::DataFrame));
}

#[test]
fn move_rekeys_state_without_executing() {
    let mut mgr = three_fragments();
    let item = Rc::clone(mgr.state(a(2)).unwrap());
    let executions = mgr.executions();

    mgr.move_source(a(2), Position::new(0, 2, 3)).unwrap();
    assert_eq!(mgr.executions(), executions);
    assert!(mgr.state(a(2)).is_none());
    let moved = mgr.state(Position::new(0, 2, 3)).unwrap();
    assert_eq!(moved.position, Position::new(0, 2, 3));
    assert_eq!(moved.snapshot, item.snapshot);
    assert_eq!(moved.value, item.value);
    assert_eq!(
        mgr.fragment(Position::new(0, 2, 3)).map(|f| f.source.as_str()),
        Some("z = y + x")
    );
}

#[test]
fn move_onto_an_occupied_cell_is_rejected() {
    let mut mgr = three_fragments();
    let err = mgr.move_source(a(0), a(1)).unwrap_err();
    assert_eq!(err, EngineError::PositionOccupied(a(1)));
    assert!(mgr.fragment(a(0)).is_some());

    let err = mgr.move_source(a(7), a(8)).unwrap_err();
    assert_eq!(err, EngineError::FragmentMissing(a(7)));
}

#[test]
fn move_to_another_sheet_rewrites_the_locator() {
    let mut mgr = three_fragments();
    mgr.set_sheet_uid(1, "budget");
    let target = Position::new(1, 0, 0);
    mgr.move_source(a(2), target).unwrap();
    let fragment = mgr.fragment(target).unwrap();
    assert_eq!(fragment.locator.sheet_uid, "budget");
    assert_eq!(fragment.locator.code_name, code_name(a(2)));
}

#[test]
fn duplicate_and_missing_positions_are_errors() {
    let mut mgr = three_fragments();
    assert_eq!(
        mgr.add_source("q = 1", a(0), "other"),
        Err(EngineError::FragmentExists(a(0)))
    );
    assert_eq!(
        mgr.update_source("q = 1", a(9)),
        Err(EngineError::FragmentMissing(a(9)))
    );
    assert_eq!(mgr.remove_source(a(9)), Err(EngineError::FragmentMissing(a(9))));
}

#[test]
fn evicted_rollback_target_falls_back_to_full_rebuild() {
    let mut mgr = manager_with(EngineConfig::default().with_max_history(1));
    add(&mut mgr, a(0), "x = 1");
    add(&mut mgr, a(1), "y = x + 1");
    add(&mut mgr, a(2), "z = y + 1");
    assert_eq!(mgr.history().len(), 1);

    mgr.update_source("z = y + 100", a(2)).unwrap();
    assert_eq!(int_at(&mgr, a(2)), Some(102));
    assert_eq!(mgr.namespace().get("x"), Some(&Value::Int(1)));
}

#[test]
fn reset_keeps_fragments_but_forgets_bindings() {
    let mut mgr = three_fragments();
    mgr.reset();
    assert_eq!(mgr.len(), 3);
    assert!(mgr.history().is_empty());
    assert!(!mgr.namespace().contains("x"));
    mgr.update_all();
    assert_eq!(int_at(&mgr, a(2)), Some(3));
}

#[test]
fn load_reads_sources_from_disk_and_rebuilds_once() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("doc-1").join("pycell").join("sheet0");
    std::fs::create_dir_all(&sheet).unwrap();
    std::fs::write(sheet.join("first.py"), "n = 4").unwrap();
    std::fs::write(sheet.join("second.py"), "n * n").unwrap();

    let mut mgr = SourceManager::new(
        "doc-1",
        EngineConfig::default(),
        Box::new(FsStore::new(dir.path())),
    );
    let skipped = mgr
        .load([(a(1), "second".to_string()), (a(0), "first".to_string())])
        .unwrap();
    assert!(skipped.is_empty());
    assert_eq!(mgr.executions(), 2);
    assert_eq!(int_at(&mgr, a(1)), Some(16));
    assert_eq!(mgr.position_of("second"), Some(a(1)));
}

#[test]
fn load_skips_fragments_whose_source_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("doc-1").join("pycell").join("sheet0");
    std::fs::create_dir_all(&sheet).unwrap();
    std::fs::write(sheet.join("kept.py"), "n = 2\nn * 3").unwrap();

    let mut mgr = SourceManager::new(
        "doc-1",
        EngineConfig::default(),
        Box::new(FsStore::new(dir.path())),
    );
    let skipped = mgr
        .load([(a(0), "kept".to_string()), (a(1), "ghost".to_string())])
        .unwrap();
    assert_eq!(skipped, vec![a(1)]);
    assert_eq!(mgr.len(), 1);
    assert!(mgr.fragment(a(1)).is_none());
    assert_eq!(int_at(&mgr, a(0)), Some(6));
    assert_eq!(mgr.executions(), 1);
}
