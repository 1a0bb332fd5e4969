//! Modules fragments can `import`.
//!
//! Only a fixed set is available: `math`, `datetime`, a `pandas` shim for
//! tabular results and a `matplotlib.pyplot` shim for figures. Everything else
//! fails with `ModuleNotFoundError`.

pub(crate) mod datetime;
pub(crate) mod math;
pub(crate) mod pandas;
pub(crate) mod pyplot;

use std::rc::Rc;

use pycell_common::{ExecError, Module, Value};
use rustc_hash::FxHashMap;

/// Import table shared by every execution of a document.
#[derive(Debug)]
pub struct ModuleTable {
    modules: FxHashMap<&'static str, Value>,
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleTable {
    pub fn new() -> Self {
        let pyplot = pyplot::module();
        let matplotlib = Value::Module(Rc::new(
            Module::new("matplotlib").with("pyplot", pyplot.clone()),
        ));
        let mut modules = FxHashMap::default();
        modules.insert("math", math::module());
        modules.insert("datetime", datetime::module());
        modules.insert("pandas", pandas::module());
        modules.insert("matplotlib", matplotlib);
        modules.insert("matplotlib.pyplot", pyplot);
        Self { modules }
    }

    /// Resolve a dotted module name.
    pub fn import(&self, name: &str) -> Result<Value, ExecError> {
        self.modules.get(name).cloned().ok_or_else(|| {
            ExecError::runtime("ModuleNotFoundError", format!("No module named '{name}'"))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.modules.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
