//! Builtin functions and exception classes visible to every fragment.

pub(crate) mod format;
pub(crate) mod methods;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use pycell_common::{Callable, Dict, ExecError, Set, Value};
use rustc_hash::FxHashMap;

use crate::args::{CallArgs, number};
use crate::interpreter::{Interpreter, items, ops};

pub type BuiltinFn = for<'i, 'a> fn(&'i mut Interpreter<'a>, CallArgs) -> Result<Value, ExecError>;

/// Host function exposed to fragment code.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    pub fn value(name: &'static str, func: BuiltinFn) -> Value {
        Value::Callable(Rc::new(Builtin { name, func }))
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

impl Callable for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `ValueError`, `KeyError`, ...: calling one builds an error value,
/// `raise` turns it into a failure.
#[derive(Debug)]
pub struct ExceptionClass {
    pub name: &'static str,
}

impl ExceptionClass {
    pub fn error(&self, message: String) -> ExecError {
        ExecError::runtime(self.name, message)
    }

    pub fn instantiate(&self, args: &CallArgs) -> Value {
        Value::error(self.error(exception_message(args)))
    }

    /// Whether `except <self>` handles an exception named `raised`.
    pub fn catches(&self, raised: &str) -> bool {
        if self.name == raised {
            return true;
        }
        match self.name {
            "BaseException" | "Exception" => true,
            "ArithmeticError" => matches!(raised, "ZeroDivisionError" | "OverflowError"),
            "LookupError" => matches!(raised, "KeyError" | "IndexError"),
            "RuntimeError" => matches!(raised, "RecursionError" | "NotImplementedError"),
            "ImportError" => raised == "ModuleNotFoundError",
            _ => false,
        }
    }
}

/// Message of an exception built from constructor arguments.
pub(crate) fn exception_message(args: &CallArgs) -> String {
    match args.positional.as_slice() {
        [] => String::new(),
        [single] => single.to_string(),
        many => Value::tuple(many.to_vec()).to_string(),
    }
}

impl Callable for ExceptionClass {
    fn name(&self) -> &str {
        self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

const EXCEPTIONS: &[&str] = &[
    "BaseException",
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "MemoryError",
    "ModuleNotFoundError",
    "NameError",
    "NotImplementedError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// Name table consulted after the document namespace.
pub struct Builtins {
    table: FxHashMap<&'static str, Value>,
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtins")
            .field("names", &self.table.len())
            .finish()
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl Builtins {
    pub fn new() -> Self {
        let functions: &[(&'static str, BuiltinFn)] = &[
            ("abs", builtin_abs),
            ("all", builtin_all),
            ("any", builtin_any),
            ("bool", builtin_bool),
            ("chr", builtin_chr),
            ("dict", builtin_dict),
            ("divmod", builtin_divmod),
            ("enumerate", builtin_enumerate),
            ("filter", builtin_filter),
            ("float", builtin_float),
            ("int", builtin_int),
            ("isinstance", builtin_isinstance),
            ("len", builtin_len),
            ("list", builtin_list),
            ("map", builtin_map),
            ("max", builtin_max),
            ("min", builtin_min),
            ("ord", builtin_ord),
            ("pow", builtin_pow),
            ("print", builtin_print),
            ("range", builtin_range),
            ("repr", builtin_repr),
            ("reversed", builtin_reversed),
            ("round", builtin_round),
            ("set", builtin_set),
            ("sorted", builtin_sorted),
            ("str", builtin_str),
            ("sum", builtin_sum),
            ("tuple", builtin_tuple),
            ("type", builtin_type),
            ("zip", builtin_zip),
        ];
        let mut table: FxHashMap<&'static str, Value> = functions
            .iter()
            .map(|&(name, func)| (name, Builtin::value(name, func)))
            .collect();
        for &name in EXCEPTIONS {
            table.insert(name, Value::Callable(Rc::new(ExceptionClass { name })));
        }
        table.insert("True", Value::Bool(true));
        table.insert("False", Value::Bool(false));
        table.insert("None", Value::None);
        Self { table }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }
}

/* ───────────────────────── helpers ───────────────────────── */

fn call1(interp: &mut Interpreter<'_>, func: &Value, v: Value) -> Result<Value, ExecError> {
    interp.call(func, CallArgs::new([v]))
}

/// Stable sort by `key`, raising the first comparison failure.
pub(crate) fn sort_values(
    interp: &mut Interpreter<'_>,
    values: &mut Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<(), ExecError> {
    let keys: Vec<Value> = match key {
        Some(k) if !k.is_none() => values
            .iter()
            .map(|v| call1(interp, k, v.clone()))
            .collect::<Result<_, _>>()?,
        _ => values.clone(),
    };
    let mut order: Vec<usize> = (0..values.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| match ops::order(&keys[a], &keys[b], "<") {
        Ok(Some(o)) if reverse => o.reverse(),
        Ok(Some(o)) => o,
        Ok(None) => Ordering::Equal,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    let sorted: Vec<Value> = order.into_iter().map(|i| values[i].clone()).collect();
    *values = sorted;
    Ok(())
}

fn extremum(
    interp: &mut Interpreter<'_>,
    args: CallArgs,
    func: &str,
    want: Ordering,
) -> Result<Value, ExecError> {
    let candidates = match args.positional.as_slice() {
        [] => return Err(ExecError::type_error(format!("{func} expected at least 1 argument, got 0"))),
        [single] => items::iterate(single)?,
        many => many.to_vec(),
    };
    let key = args.keyword("key").cloned();
    let mut best: Option<(Value, Value)> = None;
    for item in candidates {
        let k = match &key {
            Some(f) if !f.is_none() => call1(interp, f, item.clone())?,
            _ => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((bk, _)) => ops::order(&k, bk, "<")? == Some(want),
        };
        if replace {
            best = Some((k, item));
        }
    }
    match best {
        Some((_, v)) => Ok(v),
        None => args.keyword("default").cloned().ok_or_else(|| {
            ExecError::value_error(format!("{func}() arg is an empty sequence"))
        }),
    }
}

fn type_matches(interp: &Interpreter<'_>, value: &Value, class: &Value) -> Result<bool, ExecError> {
    match class {
        Value::Tuple(classes) => {
            for c in classes.iter() {
                if type_matches(interp, value, c)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Callable(c) => {
            if let (Some(exc), Value::Error(err)) = (c.as_any().downcast_ref::<ExceptionClass>(), value) {
                return Ok(interp.exception_lineage(err).iter().any(|name| exc.catches(name)));
            }
            let name = c.name();
            Ok(name == value.type_name() || (name == "int" && matches!(value, Value::Bool(_))))
        }
        Value::Class(class) => Ok(match value {
            Value::Instance(obj) => obj.class.is_subclass_of(class),
            Value::Error(err) => interp.exception_lineage(err).contains(&class.name),
            _ => false,
        }),
        _ => Err(ExecError::type_error(
            "isinstance() arg 2 must be a type or tuple of types",
        )),
    }
}

/* ───────────────────────── functions ───────────────────────── */

fn builtin_print(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let sep = args.keyword("sep").map(Value::to_string).unwrap_or_else(|| " ".into());
    let end = args.keyword("end").map(Value::to_string).unwrap_or_else(|| "\n".into());
    let line = args
        .positional
        .iter()
        .map(|v| match v {
            Value::Instance(_) => interp.str_of(v),
            other => Ok(other.to_string()),
        })
        .collect::<Result<Vec<String>, _>>()?;
    let text = format!("{}{end}", line.join(&sep));
    interp
        .effects
        .output
        .push(text.strip_suffix('\n').unwrap_or(&text).to_string());
    Ok(Value::None)
}

fn builtin_len(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("len", 1)?;
    Ok(Value::Int(items::length(&args.positional[0])? as i64))
}

const MAX_RANGE: i64 = 10_000_000;

fn builtin_range(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let ints = args
        .positional
        .iter()
        .map(|v| {
            v.as_i64().ok_or_else(|| {
                ExecError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(ExecError::type_error(format!(
                "range expected 1 to 3 arguments, got {}",
                ints.len()
            )));
        }
    };
    if step == 0 {
        return Err(ExecError::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
    if span / step.saturating_abs().max(1) > MAX_RANGE {
        return Err(ExecError::runtime("MemoryError", "range is too large"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Int(i));
        i += step;
    }
    Ok(Value::list(out))
}

fn builtin_sum(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let iterable = args.require("sum", 0, "iterable")?;
    let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
    for v in items::iterate(iterable)? {
        total = ops::binary_op(pycell_parse::ast::Operator::Add, &total, &v)?;
    }
    Ok(total)
}

fn builtin_min(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    extremum(interp, args, "min", Ordering::Less)
}

fn builtin_max(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    extremum(interp, args, "max", Ordering::Greater)
}

fn builtin_abs(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("abs", 1)?;
    match &args.positional[0] {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(ExecError::overflow),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(ExecError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_round(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let x = args.require("round", 0, "number")?;
    let digits = match args.get(1, "ndigits") {
        None | Some(Value::None) => None,
        Some(v) => Some(v.as_i64().ok_or_else(|| {
            ExecError::type_error("'ndigits' must be an integer")
        })?),
    };
    match (x, digits) {
        (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(x.as_i64().unwrap_or_default())),
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(ExecError::value_error("cannot convert float NaN or infinity to integer"));
            }
            Ok(Value::Int(f.round_ties_even() as i64))
        }
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(n.clamp(-308, 308) as i32);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (other, _) => Err(ExecError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn builtin_str(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("str", 1)?;
    Ok(Value::str(match args.positional.first() {
        Some(v) => interp.str_of(v)?,
        None => String::new(),
    }))
}

fn builtin_repr(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("repr", 1)?;
    interp.repr_of(&args.positional[0]).map(Value::str)
}

fn builtin_int(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("int", 2)?;
    let base = args.int("int", 1, "base", 10)?;
    match args.positional.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Float(f)) => {
            if !f.is_finite() {
                return Err(ExecError::value_error("cannot convert float NaN or infinity to integer"));
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Some(Value::Str(s)) => {
            let radix = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| ExecError::value_error("int() base must be >= 2 and <= 36"))?;
            let cleaned = s.trim().replace('_', "");
            i64::from_str_radix(&cleaned, radix).map(Value::Int).map_err(|_| {
                ExecError::value_error(format!(
                    "invalid literal for int() with base {base}: {}",
                    Value::Str(s.clone()).repr()
                ))
            })
        }
        Some(other) => Err(ExecError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_float(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("float", 1)?;
    match args.positional.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ExecError::value_error(format!(
                "could not convert string to float: {}",
                Value::Str(s.clone()).repr()
            ))
        }),
        Some(v) => Ok(Value::Float(number("float", v)?)),
    }
}

fn builtin_bool(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("bool", 1)?;
    Ok(Value::Bool(
        args.positional.first().is_some_and(Value::is_truthy),
    ))
}

fn builtin_list(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("list", 1)?;
    match args.positional.first() {
        None => Ok(Value::list(Vec::new())),
        Some(v) => Ok(Value::list(items::iterate(v)?)),
    }
}

fn builtin_tuple(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("tuple", 1)?;
    match args.positional.first() {
        None => Ok(Value::tuple(Vec::new())),
        Some(v) => Ok(Value::tuple(items::iterate(v)?)),
    }
}

fn builtin_set(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("set", 1)?;
    let mut set = Set::new();
    if let Some(source) = args.positional.first() {
        for item in items::iterate(source)? {
            items::hashable(&item)?;
            set.insert(item);
        }
    }
    Ok(Value::set(set))
}

fn builtin_dict(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("dict", 1)?;
    let mut dict = Dict::new();
    if let Some(source) = args.positional.first() {
        match source {
            Value::Dict(d) => {
                for (k, v) in d.iter() {
                    dict.insert(k.clone(), v.clone());
                }
            }
            other => {
                for pair in items::iterate(other)? {
                    let kv = items::iterate(&pair)?;
                    let [k, v] = <[Value; 2]>::try_from(kv).map_err(|_| {
                        ExecError::value_error(
                            "dictionary update sequence element has wrong length; 2 is required",
                        )
                    })?;
                    dict.insert(k, v);
                }
            }
        }
    }
    for (k, v) in args.keywords {
        dict.insert(Value::str(k), v);
    }
    Ok(Value::dict(dict))
}

fn builtin_sorted(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("sorted", 1)?;
    let mut values = items::iterate(&args.positional[0])?;
    let reverse = args.keyword("reverse").is_some_and(Value::is_truthy);
    sort_values(interp, &mut values, args.keyword("key"), reverse)?;
    Ok(Value::list(values))
}

fn builtin_reversed(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("reversed", 1)?;
    let mut values = items::iterate(&args.positional[0])?;
    values.reverse();
    Ok(Value::list(values))
}

fn builtin_enumerate(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let iterable = args.require("enumerate", 0, "iterable")?;
    let start = args.int("enumerate", 1, "start", 0)?;
    Ok(Value::list(
        items::iterate(iterable)?
            .into_iter()
            .zip(start..)
            .map(|(v, i)| Value::tuple(vec![Value::Int(i), v]))
            .collect(),
    ))
}

fn builtin_zip(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let columns = args
        .positional
        .iter()
        .map(items::iterate)
        .collect::<Result<Vec<_>, _>>()?;
    let n = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..n)
            .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
            .collect(),
    ))
}

fn builtin_map(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let Some((func, iterables)) = args.positional.split_first() else {
        return Err(ExecError::type_error("map() must have at least two arguments."));
    };
    let columns = iterables
        .iter()
        .map(items::iterate)
        .collect::<Result<Vec<_>, _>>()?;
    let n = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let row = CallArgs::new(columns.iter().map(|c| c[i].clone()));
        out.push(interp.call(func, row)?);
    }
    Ok(Value::list(out))
}

fn builtin_filter(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("filter", 2)?;
    let func = &args.positional[0];
    let mut out = Vec::new();
    for v in items::iterate(&args.positional[1])? {
        let keep = if func.is_none() {
            v.is_truthy()
        } else {
            call1(interp, func, v.clone())?.is_truthy()
        };
        if keep {
            out.push(v);
        }
    }
    Ok(Value::list(out))
}

fn builtin_any(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("any", 1)?;
    Ok(Value::Bool(
        items::iterate(&args.positional[0])?.iter().any(Value::is_truthy),
    ))
}

fn builtin_all(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("all", 1)?;
    Ok(Value::Bool(
        items::iterate(&args.positional[0])?.iter().all(Value::is_truthy),
    ))
}

fn builtin_divmod(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    use pycell_parse::ast::Operator;
    args.exactly("divmod", 2)?;
    let (a, b) = (&args.positional[0], &args.positional[1]);
    Ok(Value::tuple(vec![
        ops::binary_op(Operator::FloorDiv, a, b)?,
        ops::binary_op(Operator::Mod, a, b)?,
    ]))
}

fn builtin_pow(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    use pycell_parse::ast::Operator;
    let base = args.require("pow", 0, "base")?;
    let exp = args.require("pow", 1, "exp")?;
    let raised = ops::binary_op(Operator::Pow, base, exp)?;
    match args.get(2, "mod") {
        None | Some(Value::None) => Ok(raised),
        Some(m) => ops::binary_op(Operator::Mod, &raised, m),
    }
}

fn builtin_chr(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let code = args.int("chr", 0, "i", -1)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::str(c.to_string()))
        .ok_or_else(|| ExecError::value_error("chr() arg not in range(0x110000)"))
}

fn builtin_ord(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("ord", 1)?;
    let s = args.positional[0].as_str().unwrap_or_default();
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(ExecError::type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn builtin_isinstance(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("isinstance", 2)?;
    type_matches(interp, &args.positional[0], &args.positional[1]).map(Value::Bool)
}

fn builtin_type(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("type", 1)?;
    if let Value::Instance(obj) = &args.positional[0] {
        return Ok(Value::Class(obj.class.clone()));
    }
    let name = args.positional[0].type_name();
    match interp.load(name) {
        Ok(class @ Value::Callable(_)) => Ok(class),
        _ => Ok(Value::str(format!("<class '{name}'>"))),
    }
}
