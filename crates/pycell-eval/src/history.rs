//! Position-ordered namespace snapshots taken after each fragment runs.

use std::collections::BTreeMap;
use std::rc::Rc;

use pycell_common::{EngineError, Position, Value};

use crate::namespace::Namespace;

/// Side information captured alongside a snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateMeta {
    /// `print` output of the execution, one entry per line.
    pub output: Vec<String>,
    /// Source text that produced the entry.
    pub source: String,
    /// The value displays a header row.
    pub has_headers: bool,
}

/// Namespace state right after the fragment at `position` executed.
#[derive(Debug, Clone, PartialEq)]
pub struct StateItem {
    pub position: Position,
    pub snapshot: Namespace,
    pub value: Option<Value>,
    pub meta: StateMeta,
}

impl StateItem {
    pub fn is_error(&self) -> bool {
        matches!(self.value, Some(Value::Error(_)))
    }
}

/// Bounded store of [`StateItem`]s ordered by position.
///
/// Entries are shared as `Rc` so callers can check whether an entry
/// survived a replay untouched with [`Rc::ptr_eq`].
#[derive(Debug)]
pub struct StateHistory {
    entries: BTreeMap<Position, Rc<StateItem>>,
    max_entries: usize,
    /// Highest position evicted since the last `clear`.
    evicted_max: Option<Position>,
}

impl StateHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_entries: max_entries.max(1),
            evicted_max: None,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Insert or overwrite the entry for `position`, evicting the lowest
    /// positions once the capacity is exceeded.
    pub fn record_after(
        &mut self,
        position: Position,
        snapshot: Namespace,
        value: Option<Value>,
        meta: StateMeta,
    ) -> Rc<StateItem> {
        let item = Rc::new(StateItem {
            position,
            snapshot,
            value,
            meta,
        });
        self.entries.insert(position, item.clone());
        while self.entries.len() > self.max_entries {
            if let Some((evicted, _)) = self.entries.pop_first() {
                tracing::debug!(position = %evicted, "evicted state snapshot");
                self.evicted_max = self.evicted_max.max(Some(evicted));
            }
        }
        item
    }

    /// Namespace to resume from when replaying `position` and everything
    /// after it. Drops all entries at or after `position`.
    ///
    /// `baseline` is returned when nothing precedes `position`. If the
    /// immediate predecessor was evicted the entries are left untouched and
    /// [`EngineError::RollbackTargetMissing`] is returned.
    pub fn rollback_to(
        &mut self,
        position: Position,
        baseline: &Namespace,
    ) -> Result<Namespace, EngineError> {
        let predecessor = self.entries.range(..position).next_back().map(|(p, _)| *p);
        let lost = match (self.evicted_max, predecessor) {
            (Some(evicted), Some(found)) => evicted > found && evicted < position,
            (Some(evicted), None) => evicted < position,
            (None, _) => false,
        };
        if lost {
            return Err(EngineError::RollbackTargetMissing { position });
        }
        let snapshot = match predecessor {
            Some(p) => self.entries[&p].snapshot.snapshot(),
            None => baseline.snapshot(),
        };
        self.entries.split_off(&position);
        Ok(snapshot)
    }

    /// Move the entry at `old` to `new` without touching its contents.
    /// Returns whether an entry was moved.
    pub fn rekey(&mut self, old: Position, new: Position) -> bool {
        match self.entries.remove(&old) {
            Some(item) => {
                let moved = match Rc::try_unwrap(item) {
                    Ok(mut owned) => {
                        owned.position = new;
                        owned
                    }
                    Err(shared) => StateItem {
                        position: new,
                        ..(*shared).clone()
                    },
                };
                self.entries.insert(new, Rc::new(moved));
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, position: Position) -> Option<Rc<StateItem>> {
        self.entries.remove(&position)
    }

    pub fn last(&self) -> Option<&Rc<StateItem>> {
        self.entries.values().next_back()
    }

    pub fn get(&self, position: Position) -> Option<&Rc<StateItem>> {
        self.entries.get(&position)
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<StateItem>> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.evicted_max = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
