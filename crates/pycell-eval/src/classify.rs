//! Result classification: which display shape a fragment's last value takes.
//!
//! Rules run in order and the first match wins. Hosts can put their own
//! rules in front of the built-in ones with [`Classifier::prepend`].

use std::fmt;

use once_cell::unsync::OnceCell;
use pycell_common::{ResultKind, Value};
use pycell_parse::{ParsedFragment, parse_fragment};

use crate::namespace::Namespace;

/// Everything a rule may inspect. Parsing the source is deferred until a
/// rule asks for the AST.
pub struct ClassifyInput<'a> {
    pub value: Option<&'a Value>,
    pub namespace: &'a Namespace,
    pub source: &'a str,
    /// Namespace key where the plotting hook leaves a shown figure.
    pub figure_key: &'a str,
    parsed: OnceCell<Option<ParsedFragment>>,
}

impl<'a> ClassifyInput<'a> {
    pub fn new(
        value: Option<&'a Value>,
        namespace: &'a Namespace,
        source: &'a str,
        figure_key: &'a str,
    ) -> Self {
        Self {
            value,
            namespace,
            source,
            figure_key,
            parsed: OnceCell::new(),
        }
    }

    /// The parsed fragment; `None` when the source does not parse.
    pub fn parsed(&self) -> Option<&ParsedFragment> {
        self.parsed
            .get_or_init(|| parse_fragment(self.source, "<classify>").ok())
            .as_ref()
    }

    /// Dotted name of the function the final statement calls, if any.
    pub fn tail_call(&self) -> Option<String> {
        self.parsed()?.tail.as_ref()?.call_path()
    }
}

impl fmt::Debug for ClassifyInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifyInput")
            .field("value", &self.value)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Outcome of classification: the kind plus the value to display.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub kind: ResultKind,
    pub value: Value,
    /// Data-frame columns holding dates, for number formatting.
    pub date_columns: Vec<usize>,
}

impl Classified {
    pub fn new(kind: ResultKind, value: Value) -> Self {
        Self {
            kind,
            value,
            date_columns: Vec::new(),
        }
    }
}

/// One classification rule. Implementations must be deterministic and free
/// of side effects.
pub trait ClassifyRule {
    fn name(&self) -> &'static str;
    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified>;
}

struct EmptyRule;

impl ClassifyRule for EmptyRule {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        let empty = match input.value {
            None => true,
            Some(Value::Str(s)) => s.is_empty(),
            Some(Value::List(items)) | Some(Value::Tuple(items)) => items.is_empty(),
            Some(Value::Dict(d)) => d.is_empty(),
            Some(Value::Set(set)) => set.is_empty(),
            Some(Value::Series(s)) => s.is_empty(),
            Some(Value::Frame(df)) => df.n_cols() == 0,
            Some(_) => false,
        };
        empty.then(|| Classified::new(ResultKind::Empty, Value::str("")))
    }
}

struct ErrorRule;

impl ClassifyRule for ErrorRule {
    fn name(&self) -> &'static str {
        "error"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        match input.value? {
            v @ Value::Error(_) => Some(Classified::new(ResultKind::Error, v.clone())),
            _ => None,
        }
    }
}

/// A figure value, or a final `show()`/`savefig()` call after which the
/// plotting hook left a figure in the namespace.
struct PlotRule;

impl ClassifyRule for PlotRule {
    fn name(&self) -> &'static str {
        "plot"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        if let Some(v @ Value::Figure(_)) = input.value {
            return Some(Classified::new(ResultKind::Plot, v.clone()));
        }
        if !matches!(input.value, Some(Value::None)) {
            return None;
        }
        let shown = match input.namespace.get(input.figure_key) {
            Some(fig @ Value::Figure(_)) => fig,
            _ => return None,
        };
        let call = input.tail_call()?;
        let last = call.rsplit('.').next().unwrap_or(&call);
        matches!(last, "show" | "savefig")
            .then(|| Classified::new(ResultKind::Plot, shown.clone()))
    }
}

struct NoneRule;

impl ClassifyRule for NoneRule {
    fn name(&self) -> &'static str {
        "none"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        matches!(input.value, Some(Value::None))
            .then(|| Classified::new(ResultKind::None, Value::None))
    }
}

struct DataFrameRule;

impl ClassifyRule for DataFrameRule {
    fn name(&self) -> &'static str {
        "data-frame"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        match input.value? {
            v @ Value::Frame(df) => Some(Classified {
                kind: ResultKind::DataFrame,
                value: v.clone(),
                date_columns: df.date_columns(),
            }),
            _ => None,
        }
    }
}

struct SeriesRule;

impl ClassifyRule for SeriesRule {
    fn name(&self) -> &'static str {
        "series"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        match input.value? {
            v @ Value::Series(_) => Some(Classified::new(ResultKind::Series, v.clone())),
            _ => None,
        }
    }
}

/// Lists (or tuples) of rows, and flat lists as a single column.
struct TableRule;

impl ClassifyRule for TableRule {
    fn name(&self) -> &'static str {
        "table"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        match input.value? {
            v @ (Value::List(_) | Value::Tuple(_)) => {
                Some(Classified::new(ResultKind::Table, v.clone()))
            }
            Value::Set(set) => Some(Classified::new(
                ResultKind::Table,
                Value::list(set.as_slice().to_vec()),
            )),
            _ => None,
        }
    }
}

struct ScalarRule;

impl ClassifyRule for ScalarRule {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
        let v = input.value?;
        v.is_scalar()
            .then(|| Classified::new(ResultKind::Scalar, v.clone()))
    }
}

pub struct Classifier {
    rules: Vec<Box<dyn ClassifyRule>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("Classifier").field("rules", &names).finish()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(EmptyRule),
                Box::new(ErrorRule),
                Box::new(PlotRule),
                Box::new(NoneRule),
                Box::new(DataFrameRule),
                Box::new(SeriesRule),
                Box::new(TableRule),
                Box::new(ScalarRule),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn ClassifyRule>>) -> Self {
        Self { rules }
    }

    /// Run `rule` before every existing rule.
    pub fn prepend(&mut self, rule: Box<dyn ClassifyRule>) {
        self.rules.insert(0, rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn classify(&self, input: &ClassifyInput<'_>) -> Classified {
        for rule in &self.rules {
            if let Some(found) = rule.classify(input) {
                tracing::trace!(rule = rule.name(), kind = %found.kind, "classified");
                return found;
            }
        }
        let shown = input.value.map(Value::to_string).unwrap_or_default();
        Classified::new(ResultKind::Unrecognized, Value::str(shown))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pycell_common::{DataFrame, Figure, Module, Set};

    use super::*;

    fn classify(value: Option<&Value>) -> Classified {
        let ns = Namespace::new();
        Classifier::new().classify(&ClassifyInput::new(value, &ns, "", "_pc_figure"))
    }

    #[test]
    fn builtin_rule_order() {
        assert_eq!(
            Classifier::new().rule_names(),
            vec!["empty", "error", "plot", "none", "data-frame", "series", "table", "scalar"]
        );
    }

    #[test]
    fn basic_kinds() {
        assert_eq!(classify(None).kind, ResultKind::Empty);
        assert_eq!(classify(Some(&Value::str(""))).kind, ResultKind::Empty);
        assert_eq!(classify(Some(&Value::list(vec![]))).kind, ResultKind::Empty);
        assert_eq!(classify(Some(&Value::None)).kind, ResultKind::None);
        assert_eq!(classify(Some(&Value::Int(3))).kind, ResultKind::Scalar);
        assert_eq!(
            classify(Some(&Value::list(vec![Value::Int(1)]))).kind,
            ResultKind::Table
        );
        let err = Value::error(pycell_common::ExecError::zero_division());
        assert_eq!(classify(Some(&err)).kind, ResultKind::Error);
    }

    #[test]
    fn sets_show_as_a_column() {
        let set: Set = [Value::Int(3), Value::Int(1)].into_iter().collect();
        let c = classify(Some(&Value::set(set)));
        assert_eq!(c.kind, ResultKind::Table);
        assert_eq!(c.value, Value::list(vec![Value::Int(3), Value::Int(1)]));
        assert_eq!(classify(Some(&Value::set(Set::new()))).kind, ResultKind::Empty);
    }

    #[test]
    fn frames_report_date_columns() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let df = DataFrame::new(
            vec!["d".into(), "n".into()],
            vec![vec![Value::Date(date)], vec![Value::Int(1)]],
        )
        .unwrap();
        let c = classify(Some(&Value::Frame(Rc::new(df))));
        assert_eq!(c.kind, ResultKind::DataFrame);
        assert_eq!(c.date_columns, vec![0]);
    }

    #[test]
    fn unknown_values_are_stringified() {
        let m = Value::Module(Rc::new(Module::new("math")));
        let c = classify(Some(&m));
        assert_eq!(c.kind, ResultKind::Unrecognized);
        assert_eq!(c.value, Value::str("<module 'math'>"));
    }

    #[test]
    fn final_show_with_hooked_figure_is_a_plot() {
        let mut ns = Namespace::new();
        ns.set("_pc_figure", Value::Figure(Rc::new(Figure::default())));
        let input = ClassifyInput::new(Some(&Value::None), &ns, "plt.plot([1])\nplt.show()", "_pc_figure");
        assert_eq!(Classifier::new().classify(&input).kind, ResultKind::Plot);

        let other = ClassifyInput::new(Some(&Value::None), &ns, "print(1)", "_pc_figure");
        assert_eq!(Classifier::new().classify(&other).kind, ResultKind::None);
    }

    #[test]
    fn prepended_rule_wins() {
        struct Everything;
        impl ClassifyRule for Everything {
            fn name(&self) -> &'static str {
                "everything"
            }
            fn classify(&self, input: &ClassifyInput<'_>) -> Option<Classified> {
                Some(Classified::new(ResultKind::Unrecognized, input.value?.clone()))
            }
        }
        let mut classifier = Classifier::new();
        classifier.prepend(Box::new(Everything));
        let ns = Namespace::new();
        let c = classifier.classify(&ClassifyInput::new(Some(&Value::Int(1)), &ns, "1", "_pc_figure"));
        assert_eq!(c.kind, ResultKind::Unrecognized);
    }

    #[test]
    fn classification_is_idempotent() {
        let v = Value::list(vec![Value::list(vec![Value::Int(1), Value::Int(2)])]);
        assert_eq!(classify(Some(&v)), classify(Some(&v)));
    }
}
