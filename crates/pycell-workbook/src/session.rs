//! Host entry point: open documents, edit fragments and recalculate cells
//! against a [`SheetSurface`].

use std::fmt;

use pycell_common::{CellValue, EngineError, Position, ResultKind, Value};
use pycell_eval::render::render;
use pycell_eval::sizer::footprint;
use pycell_eval::{Classified, Classifier, DocumentContext, DocumentId, DocumentRegistry, SourceStore};
use rustc_hash::FxHashMap;

use crate::config::SessionConfig;
use crate::mediator::{CacheStats, CachePolicy, CodeNames, Mediator, SheetUid, Trigger};
use crate::surface::SheetSurface;
use crate::sync::{FormulaState, Synchronizer};

pub type Grid = Vec<Vec<CellValue>>;

pub struct Session {
    config: SessionConfig,
    registry: DocumentRegistry,
    mediators: FxHashMap<DocumentId, Mediator>,
    sync: Synchronizer,
    classifier: Classifier,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("documents", &self.registry.len())
            .field("sync", self.sync.config())
            .field("classifier", &self.classifier)
            .finish()
    }
}

fn parts<'s>(
    registry: &'s mut DocumentRegistry,
    mediators: &'s mut FxHashMap<DocumentId, Mediator>,
    id: &DocumentId,
) -> Result<(&'s mut DocumentContext, &'s mut Mediator), EngineError> {
    let ctx = registry.get_mut(id)?;
    let mediator = mediators
        .get_mut(id)
        .ok_or_else(|| EngineError::UnknownDocument(id.to_string()))?;
    Ok((ctx, mediator))
}

/// Register sheet uids, then load every fragment whose cell still carries
/// the recognized formula.
fn load_persisted(
    sync: &Synchronizer,
    ctx: &mut DocumentContext,
    mediator: &mut Mediator,
    surface: &dyn SheetSurface,
) -> Result<(), EngineError> {
    for sheet in 0..surface.sheet_count() {
        let uid = mediator.query(surface, &SheetUid(sheet), CachePolicy::Sheet(sheet))?;
        ctx.manager_mut().set_sheet_uid(sheet, uid);
    }
    let mut persisted = Vec::new();
    for (position, name) in mediator.query(surface, &CodeNames, CachePolicy::Document)? {
        ctx.observe_code_name(&name);
        if sync.state(mediator, surface, position)? != FormulaState::NoFormula {
            persisted.push((position, name));
        }
    }
    tracing::debug!(document = %ctx.id(), fragments = persisted.len(), "loading persisted fragments");
    let skipped = ctx.manager_mut().load(persisted)?;
    if !skipped.is_empty() {
        tracing::warn!(document = %ctx.id(), skipped = skipped.len(), "opened with unreadable fragments");
    }
    Ok(())
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, EngineError> {
        let sync = Synchronizer::new(config.sync.clone())?;
        Ok(Self {
            config,
            registry: DocumentRegistry::new(),
            mediators: FxHashMap::default(),
            sync,
            classifier: Classifier::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register extra classification rules ahead of the built-in ones.
    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    /// Create the document's context and load every fragment persisted on
    /// `surface`: cells carrying both a code-name and the recognized
    /// formula. The initial rebuild runs before this returns.
    pub fn open_document(
        &mut self,
        id: impl Into<DocumentId>,
        store: Box<dyn SourceStore>,
        surface: &dyn SheetSurface,
    ) -> Result<(), EngineError> {
        let id = id.into();
        let mut mediator = Mediator::new();
        let ctx = self.registry.open(id.clone(), self.config.engine.clone(), store);

        match load_persisted(&self.sync, ctx, &mut mediator, surface) {
            Ok(()) => {
                self.mediators.insert(id, mediator);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(document = %id, error = %err, "document failed to load");
                self.registry.close(&id);
                Err(err)
            }
        }
    }

    pub fn close_document(&mut self, id: &DocumentId) -> bool {
        self.mediators.remove(id);
        self.registry.close(id).is_some()
    }

    pub fn is_open(&self, id: &DocumentId) -> bool {
        self.registry.is_open(id)
    }

    pub fn document(&self, id: &DocumentId) -> Result<&DocumentContext, EngineError> {
        self.registry.get(id)
    }

    pub fn cache_stats(&self, id: &DocumentId) -> Result<CacheStats, EngineError> {
        self.mediators
            .get(id)
            .map(Mediator::stats)
            .ok_or_else(|| EngineError::UnknownDocument(id.to_string()))
    }

    /// Add a fragment at `position` or replace its text, and return its
    /// code-name. New fragments get a fresh code-name and the engine
    /// formula.
    pub fn set_source(
        &mut self,
        id: &DocumentId,
        surface: &mut dyn SheetSurface,
        position: Position,
        text: &str,
    ) -> Result<String, EngineError> {
        let (ctx, mediator) = parts(&mut self.registry, &mut self.mediators, id)?;
        let existing = ctx.manager().fragment(position).map(|f| f.code_name.clone());
        let name = match existing {
            Some(name) => {
                ctx.manager_mut().update_source(text, position)?;
                name
            }
            None => {
                let name = ctx.allocate_code_name();
                ctx.manager_mut().add_source(text, position, &name)?;
                if let Err(err) = self.sync.install(mediator, surface, position, &name) {
                    ctx.manager_mut().remove_source(position)?;
                    return Err(err);
                }
                name
            }
        };
        mediator.invalidate(Trigger::SourceModified(position));
        Ok(name)
    }

    /// Strip the engine formula from the cell, then drop the fragment. A
    /// surface failure leaves both the cell and the fragment as they were.
    pub fn delete_source(
        &mut self,
        id: &DocumentId,
        surface: &mut dyn SheetSurface,
        position: Position,
    ) -> Result<(), EngineError> {
        let (ctx, mediator) = parts(&mut self.registry, &mut self.mediators, id)?;
        if ctx.manager().fragment(position).is_none() {
            return Err(EngineError::FragmentMissing(position));
        }
        self.sync.uninstall(mediator, surface, position)?;
        mediator.invalidate(Trigger::CellDeleted(position));
        ctx.manager_mut().remove_source(position)
    }

    /// Follow a cell the host has already moved. Nothing is executed.
    pub fn move_cell(&mut self, id: &DocumentId, from: Position, to: Position) -> Result<(), EngineError> {
        let (ctx, mediator) = parts(&mut self.registry, &mut self.mediators, id)?;
        ctx.manager_mut().move_source(from, to)?;
        mediator.invalidate(Trigger::CellMoved { from, to });
        Ok(())
    }

    /// Classify the retained result at `position`, size it, mirror it into
    /// the sheet and return the written grid.
    pub fn recalculate(
        &mut self,
        id: &DocumentId,
        surface: &mut dyn SheetSurface,
        position: Position,
    ) -> Result<Grid, EngineError> {
        let _span = tracing::info_span!("recalculate", document = %id, %position).entered();
        let (ctx, mediator) = parts(&mut self.registry, &mut self.mediators, id)?;
        let manager = ctx.manager();
        if manager.fragment(position).is_none() {
            return Err(EngineError::FragmentMissing(position));
        }
        let classified = manager
            .classify(position, &self.classifier)
            .unwrap_or_else(|| {
                tracing::debug!(%position, "no retained state; showing an empty cell");
                Classified::new(ResultKind::Empty, Value::None)
            });
        let spill = self.sync.current_spill(mediator, surface, position)?;
        let grid = render(&classified, footprint(&classified, spill));
        self.sync.synchronize(mediator, surface, position, grid.clone())?;
        Ok(grid)
    }

    /// Recalculate every fragment of the document in position order. One
    /// failing cell does not stop the others.
    pub fn recalculate_all(
        &mut self,
        id: &DocumentId,
        surface: &mut dyn SheetSurface,
    ) -> Result<Vec<(Position, Result<Grid, EngineError>)>, EngineError> {
        let _span = tracing::info_span!("recalculate_all", document = %id).entered();
        let positions = self.registry.get(id)?.manager().positions();
        Ok(positions
            .into_iter()
            .map(|position| (position, self.recalculate(id, surface, position)))
            .collect())
    }

    /// Forget all bindings and execute every fragment again.
    pub fn reset_document(&mut self, id: &DocumentId) -> Result<(), EngineError> {
        let (ctx, mediator) = parts(&mut self.registry, &mut self.mediators, id)?;
        let manager = ctx.manager_mut();
        manager.reset();
        manager.update_all();
        mediator.clear();
        Ok(())
    }

    pub fn dump_module(&self, id: &DocumentId, position: Position, inclusive: bool) -> Result<String, EngineError> {
        Ok(self.registry.get(id)?.manager().module_source_up_to(position, inclusive))
    }

    /// Current value at `position`, if it executed and is still retained.
    pub fn value(&self, id: &DocumentId, position: Position) -> Result<Option<Value>, EngineError> {
        Ok(self.registry.get(id)?.manager().value(position).cloned())
    }

    pub fn classify(&self, id: &DocumentId, position: Position) -> Result<Option<Classified>, EngineError> {
        Ok(self.registry.get(id)?.manager().classify(position, &self.classifier))
    }
}
