use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Write as _};
use std::rc::Rc;

use chrono::{Datelike, NaiveDate};

use crate::ExecError;

/// Host-implemented callable (builtins, user functions, lambdas).
///
/// The interpreter downcasts through [`Callable::as_any`]; this crate only
/// needs identity and a name for display.
pub trait Callable: fmt::Debug {
    fn name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// A runtime value produced by fragment code.
///
/// Containers are reference counted and treated as immutable once shared:
/// mutation goes through [`Rc::make_mut`], so a namespace snapshot taken
/// earlier never observes later writes.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Date(NaiveDate),
    List(Rc<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<Dict>),
    Set(Rc<Set>),
    Frame(Rc<DataFrame>),
    Series(Rc<Series>),
    Figure(Rc<Figure>),
    Module(Rc<Module>),
    Callable(Rc<dyn Callable>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Error(Rc<ExecError>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(dict))
    }

    pub fn set(set: Set) -> Self {
        Value::Set(Rc::new(set))
    }

    pub fn error(err: ExecError) -> Self {
        Value::Error(Rc::new(err))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Frame(_) => "DataFrame",
            Value::Series(_) => "Series",
            Value::Figure(_) => "Figure",
            Value::Module(_) => "module",
            Value::Callable(_) => "function",
            Value::Class(_) => "type",
            Value::Instance(_) => "object",
            Value::Error(_) => "error",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Scalars render into a single cell.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Date(_)
        )
    }

    pub fn is_hashable(&self) -> bool {
        match self {
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Date(_)
            | Value::Class(_)
            | Value::Instance(_) => true,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Set(set) => !set.is_empty(),
            Value::Frame(df) => df.n_rows() > 0,
            Value::Series(s) => !s.values.is_empty(),
            Value::Error(_) => false,
            Value::Date(_)
            | Value::Figure(_)
            | Value::Module(_)
            | Value::Callable(_)
            | Value::Class(_)
            | Value::Instance(_) => true,
        }
    }

    /// Python `==`: numbers compare across int/float/bool, containers
    /// element-wise, everything else by identity of content.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.py_eq(w)).unwrap_or(false))
            }
            (Value::Set(a), Value::Set(b)) => a == b,
            _ => self == other,
        }
    }

    /// Python `repr()`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote_str(s),
            Value::Date(d) => format!("datetime.date({}, {}, {})", d.year(), d.month(), d.day()),
            _ => self.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => a == b,
            (Value::Series(a), Value::Series(b)) => a == b,
            (Value::Figure(a), Value::Figure(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => {
                Rc::ptr_eq(a, b) || (Rc::ptr_eq(&a.class, &b.class) && a.attrs == b.attrs)
            }
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::List(items) => write!(f, "[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0].repr()),
            Value::Tuple(items) => write!(f, "({})", join_repr(items)),
            Value::Dict(d) => {
                let body: Vec<String> = d
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", body.join(", "))
            }
            Value::Set(set) if set.is_empty() => write!(f, "set()"),
            Value::Set(set) => write!(f, "{{{}}}", join_repr(set.as_slice())),
            Value::Frame(df) => write!(f, "{df}"),
            Value::Series(s) => write!(f, "{s}"),
            Value::Figure(fig) => write!(f, "{fig}"),
            Value::Module(m) => write!(f, "<module '{}'>", m.name),
            Value::Callable(c) => write!(f, "<function {}>", c.name()),
            Value::Class(c) => write!(f, "<class '__main__.{}'>", c.name),
            Value::Instance(obj) => write!(f, "<__main__.{} object>", obj.class.name),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Python float formatting: integral values keep a trailing `.0`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/* ───────────────────────────── dict ───────────────────────────── */

/// Insertion-ordered mapping with Python key equality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.py_eq(key))
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.slot(key).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
        self.slot(key).map(|i| &mut self.entries[i].1)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.slot(key).is_some()
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.slot(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.slot(key).map(|i| self.entries.remove(i).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl FromIterator<(Value, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

/* ───────────────────────────── set ────────────────────────────── */

/// Insertion-ordered set with Python element equality.
#[derive(Debug, Clone, Default)]
pub struct Set {
    items: Vec<Value>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &Value) -> bool {
        self.items.iter().any(|v| v.py_eq(item))
    }

    /// Add `item`; `false` when an equal element was already there.
    pub fn insert(&mut self, item: Value) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, item: &Value) -> bool {
        match self.items.iter().position(|v| v.py_eq(item)) {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove and return the earliest inserted element.
    pub fn pop(&mut self) -> Option<Value> {
        (!self.items.is_empty()).then(|| self.items.remove(0))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn is_subset(&self, other: &Set) -> bool {
        self.items.iter().all(|v| other.contains(v))
    }

    pub fn union(&self, other: &Set) -> Set {
        let mut out = self.clone();
        for v in other.iter() {
            out.insert(v.clone());
        }
        out
    }

    pub fn intersection(&self, other: &Set) -> Set {
        self.iter().filter(|v| other.contains(v)).cloned().collect()
    }

    pub fn difference(&self, other: &Set) -> Set {
        self.iter().filter(|v| !other.contains(v)).cloned().collect()
    }

    pub fn symmetric_difference(&self, other: &Set) -> Set {
        let mut out = self.difference(other);
        for v in other.iter().filter(|v| !self.contains(v)) {
            out.insert(v.clone());
        }
        out
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset(other)
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        let mut set = Set::new();
        for v in iter {
            set.insert(v);
        }
        set
    }
}

/* ──────────────────────────── classes ─────────────────────────── */

/// A class defined by fragment code.
#[derive(Debug, Clone)]
pub struct Class {
    pub name: String,
    pub bases: Vec<Rc<Class>>,
    /// Builtin exception named as a base, e.g. `ValueError`.
    pub exception: Option<String>,
    pub attrs: BTreeMap<String, Value>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            exception: None,
            attrs: BTreeMap::new(),
        }
    }

    /// Attribute on the class or, depth-first, on its bases.
    pub fn lookup(&self, attr: &str) -> Option<&Value> {
        self.attrs
            .get(attr)
            .or_else(|| self.bases.iter().find_map(|base| base.lookup(attr)))
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        self.name == other.name || self.bases.iter().any(|base| base.is_subclass_of(other))
    }

    /// Builtin exception this class derives from, directly or through a base.
    pub fn exception_base(&self) -> Option<&str> {
        self.exception
            .as_deref()
            .or_else(|| self.bases.iter().find_map(|base| base.exception_base()))
    }

    /// Names from this class up through its bases, depth-first.
    pub fn lineage(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        for base in &self.bases {
            out.extend(base.lineage());
        }
        out
    }
}

/// An instance of a [`Class`]. Attribute writes go through
/// [`Rc::make_mut`] like every other container.
#[derive(Debug, Clone)]
pub struct Instance {
    pub class: Rc<Class>,
    pub attrs: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            attrs: BTreeMap::new(),
        }
    }

    /// Instance attribute, falling back to the class.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr).or_else(|| self.class.lookup(attr))
    }
}

/* ─────────────────────────── data frame ────────────────────────── */

/// Column-major table with optional row labels.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    pub columns: Vec<String>,
    /// One vector per column, all of equal length.
    pub data: Vec<Vec<Value>>,
    /// Custom row labels; `None` means default positional labels.
    pub index: Option<Vec<Value>>,
    /// Display a header row with column names.
    pub show_header: bool,
    /// Display a leading column with row labels.
    pub show_index: bool,
    /// Output of `describe()`: `data` already carries its own header row and
    /// label column, so display adds nothing.
    pub described: bool,
}

impl DataFrame {
    pub fn new(columns: Vec<String>, data: Vec<Vec<Value>>) -> Result<Self, ExecError> {
        if columns.len() != data.len() {
            return Err(ExecError::value_error(format!(
                "{} columns passed, passed data had {} columns",
                columns.len(),
                data.len()
            )));
        }
        if let Some(first) = data.first() {
            if data.iter().any(|col| col.len() != first.len()) {
                return Err(ExecError::value_error("All arrays must be of the same length"));
            }
        }
        Ok(Self {
            columns,
            data,
            index: None,
            show_header: true,
            show_index: true,
            described: false,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.data.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    pub fn row(&self, i: usize) -> Vec<Value> {
        self.data.iter().map(|col| col[i].clone()).collect()
    }

    pub fn index_labels(&self) -> Vec<Value> {
        match &self.index {
            Some(labels) => labels.clone(),
            None => (0..self.n_rows() as i64).map(Value::Int).collect(),
        }
    }

    /// Columns whose non-null cells are all dates.
    pub fn date_columns(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, col)| {
                let mut seen = false;
                let all = col.iter().all(|v| match v {
                    Value::Date(_) => {
                        seen = true;
                        true
                    }
                    Value::None => true,
                    _ => false,
                });
                all && seen
            })
            .map(|(i, _)| i)
            .collect()
    }
}

impl Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        if !self.described {
            let _ = write!(out, "{:>4}", "");
            for c in &self.columns {
                let _ = write!(out, " {c:>8}");
            }
            out.push('\n');
        }
        let labels = self.index_labels();
        for (r, label) in labels.iter().enumerate().take(self.n_rows()) {
            if !self.described {
                let _ = write!(out, "{:>4}", label.to_string());
            }
            for col in &self.data {
                let _ = write!(out, " {:>8}", col[r].to_string());
            }
            out.push('\n');
        }
        write!(f, "{}", out.trim_end())
    }
}

/// One labelled column.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: Option<String>,
    pub index: Option<Vec<Value>>,
    pub values: Vec<Value>,
}

impl Series {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            name: None,
            index: None,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index_labels(&self) -> Vec<Value> {
        match &self.index {
            Some(labels) => labels.clone(),
            None => (0..self.values.len() as i64).map(Value::Int).collect(),
        }
    }
}

impl Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, v) in self.index_labels().iter().zip(&self.values) {
            writeln!(f, "{label:<4} {v}")?;
        }
        match &self.name {
            Some(name) => write!(f, "Name: {name}, Length: {}", self.values.len()),
            None => write!(f, "Length: {}", self.values.len()),
        }
    }
}

/// A plot produced through the `matplotlib.pyplot` shim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Figure {
    pub kind: String,
    pub title: Option<String>,
    pub traces: usize,
    /// Where the plotting hook wrote the rendered figure, if anywhere.
    pub saved_to: Option<String>,
}

impl Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(t) => write!(f, "<Figure {} '{}' ({} traces)>", self.kind, t, self.traces),
            None => write!(f, "<Figure {} ({} traces)>", self.kind, self.traces),
        }
    }
}

/// Importable module: a named bag of attributes.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub attrs: BTreeMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with(mut self, attr: &str, value: Value) -> Self {
        self.attrs.insert(attr.to_string(), value);
        self
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr)
    }
}

/* ──────────────────────────── cells ───────────────────────────── */

/// What a single spreadsheet cell displays.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
}

impl CellValue {
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::None => CellValue::Empty,
            Value::Bool(b) => CellValue::Boolean(*b),
            Value::Int(i) => CellValue::Number(*i as f64),
            Value::Float(f) => CellValue::Number(*f),
            Value::Str(s) => CellValue::Text(s.to_string()),
            Value::Error(e) => CellValue::Error(e.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Error(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_display_forms() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Bool(true).to_string(), "True");
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(list.to_string(), "[1, 'a', None]");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).to_string(), "(1,)");
        assert_eq!(Value::str("it's").repr(), "'it\\'s'");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&Value::str("1")));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn dict_keeps_insertion_order_and_python_keys() {
        let mut d = Dict::new();
        d.insert(Value::str("b"), Value::Int(1));
        d.insert(Value::str("a"), Value::Int(2));
        d.insert(Value::Int(1), Value::Int(3));
        assert_eq!(d.insert(Value::Float(1.0), Value::Int(4)), Some(Value::Int(3)));
        let keys: Vec<String> = d.keys().map(Value::repr).collect();
        assert_eq!(keys, vec!["'b'", "'a'", "1"]);
        assert_eq!(Value::dict(d).to_string(), "{'b': 1, 'a': 2, 1: 4}");
    }

    #[test]
    fn frame_shape_and_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let df = DataFrame::new(
            vec!["when".into(), "n".into()],
            vec![
                vec![Value::Date(d), Value::None],
                vec![Value::Int(1), Value::Int(2)],
            ],
        )
        .unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.date_columns(), vec![0]);
        assert!(DataFrame::new(vec!["a".into()], vec![]).is_err());
    }

    #[test]
    fn sets_ignore_order_and_duplicates() {
        let a: Set = [Value::Int(1), Value::Int(2), Value::Float(1.0)].into_iter().collect();
        let b: Set = [Value::Int(2), Value::Int(1)].into_iter().collect();
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
        assert_eq!(Value::set(a.clone()).to_string(), "{1, 2}");
        assert_eq!(Value::set(Set::new()).to_string(), "set()");
        let c: Set = [Value::Int(2), Value::Int(3)].into_iter().collect();
        assert_eq!(a.intersection(&c).as_slice(), &[Value::Int(2)]);
        assert_eq!(a.symmetric_difference(&c).len(), 2);
    }

    #[test]
    fn class_lookup_walks_bases() {
        let mut base = Class::new("Base");
        base.attrs.insert("kind".into(), Value::str("base"));
        base.exception = Some("ValueError".into());
        let mut child = Class::new("Child");
        child.bases.push(Rc::new(base.clone()));
        let child = Rc::new(child);
        assert_eq!(child.lookup("kind"), Some(&Value::str("base")));
        assert!(child.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&child));
        assert_eq!(child.exception_base(), Some("ValueError"));
        assert_eq!(child.lineage(), vec!["Child", "Base"]);

        let mut obj = Instance::new(child);
        obj.attrs.insert("kind".into(), Value::str("own"));
        assert_eq!(obj.get("kind"), Some(&Value::str("own")));
        assert_eq!(Value::Instance(Rc::new(obj)).to_string(), "<__main__.Child object>");
    }

    #[test]
    fn shared_containers_copy_on_write() {
        let a = Value::list(vec![Value::Int(1)]);
        let mut b = a.clone();
        if let Value::List(items) = &mut b {
            Rc::make_mut(items).push(Value::Int(2));
        }
        assert_eq!(a.to_string(), "[1]");
        assert_eq!(b.to_string(), "[1, 2]");
    }
}
