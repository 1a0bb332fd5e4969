//! Atomic application of sheet commands.
//!
//! A [`Journal`] remembers every command it applied. If a later command
//! fails, [`Journal::rollback`] undoes the applied ones newest first, so the
//! sheet ends up exactly as it was before the batch started.

use std::cell::RefCell;
use std::fmt;

use crate::error::SurfaceError;
use crate::surface::SheetSurface;

/// A reversible sheet mutation.
///
/// `execute` captures whatever it needs to restore the prior state;
/// `undo` is only called after a successful `execute`.
pub trait Command: fmt::Debug {
    fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError>;

    fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError>;

    /// Short human-readable form for logs.
    fn describe(&self) -> String;

    /// Sheet this command writes to.
    fn sheet(&self) -> u32;
}

/// Receives journal events. Injected so hosts can route them anywhere.
pub trait CommandLog {
    fn applied(&self, journal: &str, command: &dyn Command);
    fn failed(&self, journal: &str, command: &dyn Command, error: &SurfaceError);
    fn undone(&self, journal: &str, command: &dyn Command);
    fn undo_failed(&self, journal: &str, command: &dyn Command, error: &SurfaceError);
}

/// Default log: forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl CommandLog for TracingLog {
    fn applied(&self, journal: &str, command: &dyn Command) {
        tracing::debug!(journal, command = %command.describe(), "applied");
    }

    fn failed(&self, journal: &str, command: &dyn Command, error: &SurfaceError) {
        tracing::warn!(journal, command = %command.describe(), %error, "command failed");
    }

    fn undone(&self, journal: &str, command: &dyn Command) {
        tracing::debug!(journal, command = %command.describe(), "undone");
    }

    fn undo_failed(&self, journal: &str, command: &dyn Command, error: &SurfaceError) {
        tracing::error!(journal, command = %command.describe(), %error, "rollback step failed");
    }
}

/// Keeps journal events in memory, one line per event.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: RefCell<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    fn push(&self, line: String) {
        self.lines.borrow_mut().push(line);
    }
}

impl CommandLog for MemoryLog {
    fn applied(&self, journal: &str, command: &dyn Command) {
        self.push(format!("{journal}: applied {}", command.describe()));
    }

    fn failed(&self, journal: &str, command: &dyn Command, error: &SurfaceError) {
        self.push(format!("{journal}: failed {}: {error}", command.describe()));
    }

    fn undone(&self, journal: &str, command: &dyn Command) {
        self.push(format!("{journal}: undone {}", command.describe()));
    }

    fn undo_failed(&self, journal: &str, command: &dyn Command, error: &SurfaceError) {
        self.push(format!("{journal}: undo failed {}: {error}", command.describe()));
    }
}

pub struct Journal<'l> {
    name: String,
    applied: Vec<Box<dyn Command>>,
    log: &'l dyn CommandLog,
}

impl fmt::Debug for Journal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("name", &self.name)
            .field("applied", &self.applied)
            .finish()
    }
}

impl<'l> Journal<'l> {
    pub fn new(name: impl Into<String>, log: &'l dyn CommandLog) -> Self {
        Self {
            name: name.into(),
            applied: Vec::new(),
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Execute `command`; it is recorded only if it succeeds.
    pub fn apply(
        &mut self,
        surface: &mut dyn SheetSurface,
        mut command: Box<dyn Command>,
    ) -> Result<(), SurfaceError> {
        match command.execute(surface) {
            Ok(()) => {
                self.log.applied(&self.name, command.as_ref());
                self.applied.push(command);
                Ok(())
            }
            Err(err) => {
                self.log.failed(&self.name, command.as_ref(), &err);
                Err(err)
            }
        }
    }

    /// Undo every applied command, newest first. Keeps going past a failing
    /// undo and reports the first failure.
    pub fn rollback(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
        let mut first_err = None;
        while let Some(mut command) = self.applied.pop() {
            match command.undo(surface) {
                Ok(()) => self.log.undone(&self.name, command.as_ref()),
                Err(err) => {
                    self.log.undo_failed(&self.name, command.as_ref(), &err);
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Finish the batch, handing back what was applied.
    pub fn commit(self) -> Vec<Box<dyn Command>> {
        self.applied
    }
}

/// Apply `commands` in order; on the first failure undo everything already
/// applied and return that failure.
pub fn run_atomic(
    surface: &mut dyn SheetSurface,
    log: &dyn CommandLog,
    name: &str,
    commands: Vec<Box<dyn Command>>,
) -> Result<Vec<Box<dyn Command>>, SurfaceError> {
    let mut journal = Journal::new(name, log);
    for command in commands {
        if let Err(err) = journal.apply(surface, command) {
            if let Err(undo_err) = journal.rollback(surface) {
                tracing::error!(journal = name, error = %undo_err, "rollback incomplete");
            }
            return Err(err);
        }
    }
    Ok(journal.commit())
}

#[cfg(test)]
mod tests {
    use pycell_common::{CellValue, Position};

    use super::*;
    use crate::memory::MemoryWorkbook;

    #[derive(Debug)]
    struct Put {
        pos: Position,
        value: f64,
    }

    impl Command for Put {
        fn execute(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
            surface.set_value(self.pos, CellValue::Number(self.value))
        }

        fn undo(&mut self, surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
            surface.set_value(self.pos, CellValue::Empty)
        }

        fn describe(&self) -> String {
            format!("put {}", self.pos.a1())
        }

        fn sheet(&self) -> u32 {
            self.pos.sheet
        }
    }

    #[derive(Debug)]
    struct Refuse;

    impl Command for Refuse {
        fn execute(&mut self, _surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
            Err(SurfaceError::host("refused"))
        }

        fn undo(&mut self, _surface: &mut dyn SheetSurface) -> Result<(), SurfaceError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "refuse".to_string()
        }

        fn sheet(&self) -> u32 {
            0
        }
    }

    fn put(row: u32, value: f64) -> Box<dyn Command> {
        Box::new(Put {
            pos: Position::new(0, row, 0),
            value,
        })
    }

    #[test]
    fn failure_undoes_applied_commands_newest_first() {
        let mut wb = MemoryWorkbook::new();
        let log = MemoryLog::new();
        let err = run_atomic(&mut wb, &log, "batch", vec![put(0, 1.0), put(1, 2.0), Box::new(Refuse)])
            .unwrap_err();
        assert_eq!(err, SurfaceError::host("refused"));
        assert_eq!(wb.value(Position::new(0, 0, 0)).unwrap(), CellValue::Empty);
        assert_eq!(wb.value(Position::new(0, 1, 0)).unwrap(), CellValue::Empty);
        assert_eq!(
            log.lines(),
            vec![
                "batch: applied put A1",
                "batch: applied put A2",
                "batch: failed refuse: refused",
                "batch: undone put A2",
                "batch: undone put A1",
            ]
        );
    }

    #[test]
    fn commit_hands_back_applied_commands() {
        let mut wb = MemoryWorkbook::new();
        let log = TracingLog;
        let mut journal = Journal::new("two", &log);
        journal.apply(&mut wb, put(0, 5.0)).unwrap();
        journal.apply(&mut wb, put(1, 6.0)).unwrap();
        assert_eq!(journal.len(), 2);
        let applied = journal.commit();
        assert_eq!(applied.iter().map(|c| c.describe()).collect::<Vec<_>>(), ["put A1", "put A2"]);
        assert_eq!(wb.value(Position::new(0, 1, 0)).unwrap(), CellValue::Number(6.0));
    }
}
