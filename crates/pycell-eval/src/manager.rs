//! Ordered fragment collection of one document and its replay policy.
//!
//! Dependencies between fragments are approximated by position: appending
//! or editing the last fragment replays only that fragment, any other
//! change rebuilds the whole module from the baseline.

use std::collections::BTreeMap;
use std::rc::Rc;

use pycell_common::{EngineError, Position, SourceLocator, Value};
use rustc_hash::FxHashMap;

use crate::classify::{Classified, ClassifyInput, Classifier};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::history::{StateHistory, StateItem, StateMeta};
use crate::namespace::Namespace;
use crate::store::SourceStore;

/// One cell's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub position: Position,
    pub code_name: String,
    pub source: String,
    pub locator: SourceLocator,
}

pub struct SourceManager {
    document_id: String,
    ctx: ExecutionContext,
    history: StateHistory,
    fragments: BTreeMap<Position, Fragment>,
    store: Box<dyn SourceStore>,
    sheet_uids: FxHashMap<u32, String>,
    executions: u64,
}

impl std::fmt::Debug for SourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceManager")
            .field("document_id", &self.document_id)
            .field("fragments", &self.fragments.len())
            .field("history", &self.history.len())
            .field("executions", &self.executions)
            .finish()
    }
}

impl SourceManager {
    pub fn new(document_id: impl Into<String>, config: EngineConfig, store: Box<dyn SourceStore>) -> Self {
        let history = StateHistory::new(config.max_history);
        Self {
            document_id: document_id.into(),
            ctx: ExecutionContext::new(config),
            history,
            fragments: BTreeMap::new(),
            store,
            sheet_uids: FxHashMap::default(),
            executions: 0,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }

    /// Unique id used for `sheet` in source locators. Defaults to
    /// `sheet<index>` until the host supplies one.
    pub fn set_sheet_uid(&mut self, sheet: u32, uid: impl Into<String>) {
        self.sheet_uids.insert(sheet, uid.into());
    }

    fn sheet_uid(&self, sheet: u32) -> String {
        self.sheet_uids
            .get(&sheet)
            .cloned()
            .unwrap_or_else(|| format!("sheet{sheet}"))
    }

    pub fn locator(&self, position: Position, code_name: &str) -> Result<SourceLocator, EngineError> {
        let config = self.ctx.config();
        SourceLocator::new(
            config.store_scheme.as_str(),
            self.document_id.as_str(),
            config.code_root.as_str(),
            self.sheet_uid(position.sheet),
            code_name,
        )
        .map_err(|e| EngineError::collaborator("source locator", e))
    }

    /* ─────────────────────────── operations ─────────────────────────── */

    /// Register a new fragment at a free `position` and execute it (alone
    /// when it is last, otherwise through a full rebuild).
    pub fn add_source(&mut self, text: &str, position: Position, code_name: &str) -> Result<(), EngineError> {
        if self.fragments.contains_key(&position) {
            return Err(EngineError::FragmentExists(position));
        }
        let locator = self.locator(position, code_name)?;
        self.store.ensure_container(&locator)?;
        self.store.write(&locator, text)?;
        self.fragments.insert(
            position,
            Fragment {
                position,
                code_name: code_name.to_string(),
                source: text.to_string(),
                locator,
            },
        );
        if self.is_last(position) {
            tracing::debug!(%position, "append: executing new tail fragment");
            self.execute_at(position);
        } else {
            self.update_all();
        }
        Ok(())
    }

    /// Replace the text of an existing fragment and replay.
    pub fn update_source(&mut self, text: &str, position: Position) -> Result<(), EngineError> {
        let fragment = self
            .fragments
            .get_mut(&position)
            .ok_or(EngineError::FragmentMissing(position))?;
        self.store.write(&fragment.locator, text)?;
        fragment.source = text.to_string();
        if self.is_last(position) {
            let index = self.fragments.len() - 1;
            self.update_from_index(index);
        } else {
            self.update_all();
        }
        Ok(())
    }

    /// Delete a fragment and its stored text, then rebuild.
    pub fn remove_source(&mut self, position: Position) -> Result<(), EngineError> {
        let fragment = self
            .fragments
            .remove(&position)
            .ok_or(EngineError::FragmentMissing(position))?;
        if let Err(err) = self.store.delete(&fragment.locator) {
            tracing::warn!(%position, error = %err, "could not delete fragment source");
        }
        self.history.remove(position);
        self.update_all();
        Ok(())
    }

    /// Re-key a fragment and its state to `new` without executing anything.
    pub fn move_source(&mut self, old: Position, new: Position) -> Result<(), EngineError> {
        if old == new {
            return Ok(());
        }
        if self.fragments.contains_key(&new) {
            return Err(EngineError::PositionOccupied(new));
        }
        let mut fragment = self
            .fragments
            .remove(&old)
            .ok_or(EngineError::FragmentMissing(old))?;
        let locator = self.locator(new, &fragment.code_name)?;
        if locator != fragment.locator {
            let moved = self
                .store
                .ensure_container(&locator)
                .and_then(|_| self.store.write(&locator, &fragment.source))
                .and_then(|_| self.store.delete(&fragment.locator));
            if let Err(err) = moved {
                self.fragments.insert(old, fragment);
                return Err(err.into());
            }
            fragment.locator = locator;
        }
        fragment.position = new;
        self.fragments.insert(new, fragment);
        self.history.rekey(old, new);
        tracing::debug!(%old, %new, "moved fragment");
        Ok(())
    }

    /// Roll back to the state before the fragment at `index` and replay it
    /// and everything after it. Falls back to a full rebuild when the
    /// rollback snapshot is gone.
    pub fn update_from_index(&mut self, index: usize) {
        let Some(start) = self.fragments.keys().nth(index).copied() else {
            return;
        };
        match self.history.rollback_to(start, self.ctx.baseline()) {
            Ok(snapshot) => {
                self.ctx.restore(snapshot);
                let replay: Vec<Position> = self.fragments.range(start..).map(|(p, _)| *p).collect();
                for position in replay {
                    self.execute_at(position);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "falling back to full rebuild");
                self.update_all();
            }
        }
    }

    /// Reset the namespace, clear the history and execute every fragment in
    /// position order.
    pub fn update_all(&mut self) {
        let _span = tracing::info_span!("update_all", fragments = self.fragments.len()).entered();
        self.ctx.reset();
        self.history.clear();
        let positions: Vec<Position> = self.fragments.keys().copied().collect();
        for position in positions {
            self.execute_at(position);
        }
    }

    /// Register persisted fragments, reading each text from the store, then
    /// rebuild once. Fragments whose text cannot be read are logged and
    /// left out; their positions are returned.
    pub fn load(
        &mut self,
        fragments: impl IntoIterator<Item = (Position, String)>,
    ) -> Result<Vec<Position>, EngineError> {
        let mut skipped = Vec::new();
        for (position, code_name) in fragments {
            if self.fragments.contains_key(&position) {
                return Err(EngineError::FragmentExists(position));
            }
            let locator = self.locator(position, &code_name)?;
            let source = match self.store.read(&locator) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(%position, %locator, error = %err, "skipping unreadable fragment");
                    skipped.push(position);
                    continue;
                }
            };
            self.fragments.insert(
                position,
                Fragment {
                    position,
                    code_name,
                    source,
                    locator,
                },
            );
        }
        self.update_all();
        Ok(skipped)
    }

    /// Forget every binding and snapshot; fragments stay registered.
    pub fn reset(&mut self) {
        self.ctx.reset();
        self.history.clear();
    }

    fn is_last(&self, position: Position) -> bool {
        self.fragments.keys().next_back() == Some(&position)
    }

    fn execute_at(&mut self, position: Position) -> Option<Rc<StateItem>> {
        let (source, label) = {
            let fragment = self.fragments.get(&position)?;
            (fragment.source.clone(), fragment.code_name.clone())
        };
        let outcome = self.ctx.execute_labelled(&source, &label);
        self.executions += 1;
        let has_headers = matches!(
            &outcome.value,
            Some(Value::Frame(df)) if df.show_header && !df.described
        );
        let meta = StateMeta {
            output: outcome.output,
            source,
            has_headers,
        };
        Some(
            self.history
                .record_after(position, self.ctx.snapshot(), outcome.value, meta),
        )
    }

    /* ─────────────────────────── accessors ─────────────────────────── */

    /// Concatenated sources before `position` (and at it, if `inclusive`).
    pub fn module_source_up_to(&self, position: Position, inclusive: bool) -> String {
        self.fragments
            .values()
            .take_while(|f| f.position < position || (inclusive && f.position == position))
            .map(|f| f.source.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn fragment(&self, position: Position) -> Option<&Fragment> {
        self.fragments.get(&position)
    }

    pub fn position_of(&self, code_name: &str) -> Option<Position> {
        self.fragments
            .values()
            .find(|f| f.code_name == code_name)
            .map(|f| f.position)
    }

    pub fn positions(&self) -> Vec<Position> {
        self.fragments.keys().copied().collect()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn state(&self, position: Position) -> Option<&Rc<StateItem>> {
        self.history.get(position)
    }

    /// Last captured value at `position`, if it executed and is still
    /// retained.
    pub fn value(&self, position: Position) -> Option<&Value> {
        self.history.get(position)?.value.as_ref()
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    pub fn namespace(&self) -> &Namespace {
        self.ctx.namespace()
    }

    /// Number of fragment executions since creation.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// Classify the retained result at `position`.
    pub fn classify(&self, position: Position, classifier: &Classifier) -> Option<Classified> {
        let item = self.history.get(position)?;
        let input = ClassifyInput::new(
            item.value.as_ref(),
            &item.snapshot,
            &item.meta.source,
            &self.ctx.config().figure_key,
        );
        Some(classifier.classify(&input))
    }
}
