//! Execution of single fragments against a document's shared namespace.

use std::rc::Rc;

use pycell_common::{ExecError, Figure, Value};
use pycell_parse::{Tail, parse_fragment};
use rustc_hash::FxHashSet;

use crate::builtins::Builtins;
use crate::config::EngineConfig;
use crate::interpreter::{Effects, Interpreter};
use crate::modules::ModuleTable;
use crate::namespace::Namespace;

/// What one execution produced besides namespace changes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecOutcome {
    /// Captured tail value; `None` when the fragment ends in a statement
    /// without a value. Failures are `Some(Value::Error(..))`.
    pub value: Option<Value>,
    /// Captured `print` output, one entry per line.
    pub output: Vec<String>,
    /// Figure handed over by `show()`/`savefig()`.
    pub figure: Option<Figure>,
}

impl ExecOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self.value, Some(Value::Error(_)))
    }

    pub fn output_text(&self) -> String {
        self.output.join("\n")
    }
}

/// Owns the shared namespace of one document and runs fragments against it.
#[derive(Debug)]
pub struct ExecutionContext {
    config: EngineConfig,
    namespace: Namespace,
    baseline: Namespace,
    builtins: Builtins,
    modules: ModuleTable,
}

impl ExecutionContext {
    /// Build a context and capture the reset baseline: `__name__` plus
    /// whatever the configured prelude binds.
    pub fn new(config: EngineConfig) -> Self {
        let mut ctx = Self {
            config,
            namespace: Namespace::new(),
            baseline: Namespace::new(),
            builtins: Builtins::new(),
            modules: ModuleTable::new(),
        };
        ctx.namespace.set("__name__", Value::str("__main__"));
        if let Some(prelude) = ctx.config.prelude.clone() {
            let outcome = ctx.execute_labelled(&prelude, "prelude");
            if let Some(Value::Error(err)) = &outcome.value {
                tracing::warn!(error = %err, "prelude failed; baseline keeps its partial state");
            }
            ctx.clear_reserved();
        }
        ctx.baseline = ctx.namespace.snapshot();
        ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn baseline(&self) -> &Namespace {
        &self.baseline
    }

    pub fn snapshot(&self) -> Namespace {
        self.namespace.snapshot()
    }

    /// Replace the live namespace, e.g. with a rollback snapshot.
    pub fn restore(&mut self, snapshot: Namespace) {
        self.namespace = snapshot;
    }

    /// Back to the post-initialization baseline.
    pub fn reset(&mut self) {
        self.namespace = self.baseline.snapshot();
    }

    /// Run `source` and return its captured value.
    pub fn execute(&mut self, source: &str) -> Option<Value> {
        self.execute_labelled(source, "<cell>").value
    }

    /// Run `source`; `label` names the fragment in diagnostics and in the
    /// path a shown figure is saved to.
    pub fn execute_labelled(&mut self, source: &str, label: &str) -> ExecOutcome {
        self.clear_reserved();
        let before: Option<FxHashSet<String>> = self
            .config
            .private_names
            .then(|| self.namespace.iter().map(|(k, _)| k.to_string()).collect());

        let mut effects = Effects {
            figure_path: format!("{}/{label}.png", self.config.figure_dir),
            ..Effects::default()
        };
        let value = match self.run(source, label, &mut effects) {
            Ok(value) => value,
            Err(err) => {
                if self.config.verbose {
                    tracing::warn!(fragment = label, error = %err, source, "fragment failed");
                } else {
                    tracing::warn!(fragment = label, error = %err, "fragment failed");
                }
                Some(Value::error(err))
            }
        };
        tracing::debug!(fragment = label, has_value = value.is_some(), "executed fragment");

        if let Some(v) = &value {
            self.namespace.set(self.config.result_key.clone(), v.clone());
        }
        let figure = effects.shown.take();
        if let Some(fig) = &figure {
            self.namespace
                .set(self.config.figure_key.clone(), Value::Figure(Rc::new(fig.clone())));
        }
        if let Some(before) = before {
            self.drop_private(&before);
        }
        ExecOutcome {
            value,
            output: effects.output,
            figure,
        }
    }

    fn run(
        &mut self,
        source: &str,
        label: &str,
        effects: &mut Effects,
    ) -> Result<Option<Value>, ExecError> {
        let parsed = parse_fragment(source, label)?;
        let mut interp = Interpreter::new(
            &mut self.namespace,
            &self.builtins,
            &self.modules,
            effects,
            self.config.max_call_depth,
        );
        interp.run(&parsed.body)?;
        let Some(tail) = &parsed.tail else {
            return Ok(None);
        };
        let value = interp.eval(tail.value_expr())?;
        match tail {
            Tail::Expr(_) => {}
            Tail::Assign { targets, .. } => {
                for target in targets {
                    interp.assign_target(target, value.clone())?;
                }
            }
            Tail::AnnAssign { target, .. } => interp.assign_target(target, value.clone())?,
        }
        Ok(Some(value))
    }

    fn clear_reserved(&mut self) {
        self.namespace.remove(&self.config.result_key);
        self.namespace.remove(&self.config.figure_key);
    }

    /// Remove underscore-prefixed bindings introduced since `before`.
    fn drop_private(&mut self, before: &FxHashSet<String>) {
        let config = &self.config;
        let baseline = &self.baseline;
        self.namespace.retain(|name, _| {
            !name.starts_with('_')
                || before.contains(name)
                || baseline.contains(name)
                || config.is_reserved(name)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(EngineConfig::default())
    }

    #[test]
    fn assignment_tail_yields_assigned_value() {
        let mut ctx = ctx();
        assert_eq!(ctx.execute("a = 2\nb = a * 21"), Some(Value::Int(42)));
        assert_eq!(ctx.namespace().get("b"), Some(&Value::Int(42)));
        assert_eq!(ctx.namespace().get("_pc_last"), Some(&Value::Int(42)));
    }

    #[test]
    fn statement_tail_has_no_value_and_clears_last() {
        let mut ctx = ctx();
        ctx.execute("1");
        assert_eq!(ctx.execute("for i in range(3):\n    pass"), None);
        assert!(!ctx.namespace().contains("_pc_last"));
    }

    #[test]
    fn failures_become_error_values_and_keep_partial_state() {
        let mut ctx = ctx();
        let v = ctx.execute("p = 1\nq = undefined_name\nr = 3").unwrap();
        match v {
            Value::Error(e) => assert_eq!(e.exception_name(), "NameError"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(ctx.namespace().get("p"), Some(&Value::Int(1)));
        assert!(!ctx.namespace().contains("r"));
    }

    #[test]
    fn syntax_errors_are_values() {
        let mut ctx = ctx();
        let v = ctx.execute("x = (").unwrap();
        assert!(matches!(v, Value::Error(ref e) if e.is_syntax()));
    }

    #[test]
    fn reset_restores_baseline() {
        let mut ctx = ExecutionContext::new(EngineConfig::default().with_prelude("import math\nk = 7"));
        ctx.execute("z = k + 1");
        assert!(ctx.namespace().contains("z"));
        ctx.reset();
        assert!(!ctx.namespace().contains("z"));
        assert_eq!(ctx.namespace().get("k"), Some(&Value::Int(7)));
        assert!(ctx.namespace().contains("math"));
        assert_eq!(ctx.namespace().get("__name__"), Some(&Value::str("__main__")));
    }

    #[test]
    fn private_names_are_filtered_when_enabled() {
        let mut filtered = ExecutionContext::new(EngineConfig::default().with_private_names(true));
        filtered.execute("_tmp = 5\nvisible = _tmp * 2");
        assert!(!filtered.namespace().contains("_tmp"));
        assert_eq!(filtered.namespace().get("visible"), Some(&Value::Int(10)));
        assert!(filtered.namespace().contains("_pc_last"));

        let mut open = ctx();
        open.execute("_tmp = 5");
        assert!(open.namespace().contains("_tmp"));
    }

    #[test]
    fn debug_output_summarizes_builtins() {
        let rendered = format!("{:?}", ctx());
        assert!(rendered.contains("Builtins { names: "));
    }

    #[test]
    fn print_output_is_captured() {
        let mut ctx = ctx();
        let out = ctx.execute_labelled("print('a', 1)\nprint('b')\n3", "A1");
        assert_eq!(out.output, vec!["a 1".to_string(), "b".to_string()]);
        assert_eq!(out.value, Some(Value::Int(3)));
    }

    #[test]
    fn shown_figure_is_stored_under_figure_key() {
        let mut ctx = ctx();
        let out = ctx.execute_labelled(
            "import matplotlib.pyplot as plt\nplt.plot([1, 2, 3])\nplt.title('t')\nplt.show()",
            "pycell_1",
        );
        assert_eq!(out.value, Some(Value::None));
        let fig = out.figure.expect("figure shown");
        assert_eq!(fig.kind, "line");
        assert_eq!(fig.saved_to.as_deref(), Some("figures/pycell_1.png"));
        assert!(matches!(ctx.namespace().get("_pc_figure"), Some(Value::Figure(_))));

        ctx.execute("1");
        assert!(!ctx.namespace().contains("_pc_figure"));
    }

    #[test]
    fn subscript_tail_assigns_and_captures() {
        let mut ctx = ctx();
        ctx.execute("d = {}");
        assert_eq!(ctx.execute("d['k'] = 9"), Some(Value::Int(9)));
        assert_eq!(ctx.execute("d['k']"), Some(Value::Int(9)));
    }
}
