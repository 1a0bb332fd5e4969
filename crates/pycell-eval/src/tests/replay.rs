// Replay equivalence: whatever sequence of edits produced the current
// fragment set, the namespace matches a clean in-order replay of it.

use std::collections::BTreeMap;

use proptest::prelude::*;
use pycell_common::Position;

use super::common::*;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::manager::SourceManager;

#[derive(Debug, Clone)]
enum Op {
    Add(u32, String),
    Update(u32, String),
    Remove(u32),
}

fn arb_source() -> impl Strategy<Value = String> {
    let var = 0..4u8;
    prop_oneof![
        3 => (var.clone(), 0..100i64).prop_map(|(v, n)| format!("v{v} = {n}")),
        3 => (var.clone(), var.clone(), 0..10i64)
            .prop_map(|(v, w, n)| format!("v{v} = v{w} + {n}")),
        1 => (var.clone(), 0..3i64).prop_map(|(v, n)| format!("v{v} = 10 // {n}")),
        1 => (var.clone(), var.clone())
            .prop_map(|(v, w)| format!("acc = [v{v}]\nacc.append(v{w})\nacc")),
        1 => var.clone().prop_map(|v| format!("del v{v}")),
        1 => (var.clone(), var).prop_map(|(v, w)| format!("_t{v} = v{w}\nv{v} = _t{v} * 2")),
    ]
}

/// Tiny histories force the evicted-snapshot fallback to a full rebuild.
fn arb_config() -> impl Strategy<Value = EngineConfig> {
    (prop::sample::select(vec![1usize, 2, 256]), any::<bool>()).prop_map(
        |(max_history, private_names)| EngineConfig {
            max_history,
            private_names,
            ..EngineConfig::default()
        },
    )
}

fn arb_op() -> impl Strategy<Value = Op> {
    let row = 0..6u32;
    prop_oneof![
        4 => (row.clone(), arb_source()).prop_map(|(r, s)| Op::Add(r, s)),
        3 => (row.clone(), arb_source()).prop_map(|(r, s)| Op::Update(r, s)),
        2 => row.prop_map(Op::Remove),
    ]
}

/// Apply `op` when it is valid for the current fragment set; invalid
/// operations are rejected by the manager and leave it unchanged.
fn apply(mgr: &mut SourceManager, op: &Op) {
    let _ = match op {
        Op::Add(r, text) => mgr.add_source(text, a(*r), &code_name(a(*r))),
        Op::Update(r, text) => mgr.update_source(text, a(*r)),
        Op::Remove(r) => mgr.remove_source(a(*r)),
    };
}

fn clean_replay(config: EngineConfig, fragments: &BTreeMap<Position, String>) -> ExecutionContext {
    let mut ctx = ExecutionContext::new(config);
    for (pos, source) in fragments {
        ctx.execute_labelled(source, &code_name(*pos));
    }
    ctx
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn edits_match_clean_replay(
        config in arb_config(),
        ops in prop::collection::vec(arb_op(), 1..24),
    ) {
        let mut mgr = manager_with(config.clone());
        for op in &ops {
            apply(&mut mgr, op);
        }
        let fragments: BTreeMap<Position, String> = mgr
            .fragments()
            .map(|f| (f.position, f.source.clone()))
            .collect();
        let reference = clean_replay(config, &fragments);
        prop_assert_eq!(mgr.namespace(), reference.namespace());
    }

    #[test]
    fn rebuild_twice_is_stable(
        config in arb_config(),
        ops in prop::collection::vec(arb_op(), 1..16),
    ) {
        let mut mgr = manager_with(config);
        for op in &ops {
            apply(&mut mgr, op);
        }
        mgr.update_all();
        let first = mgr.namespace().clone();
        mgr.update_all();
        prop_assert_eq!(&first, mgr.namespace());
    }
}
