//! Attribute access and method calls on runtime values.

use std::rc::Rc;

use pycell_common::{Dict, ExecError, Set, Value};

use super::{format, sort_values};
use crate::args::CallArgs;
use crate::interpreter::{Interpreter, items, ops};
use crate::modules::{datetime, pandas, pyplot};

const LIST_MUTATING: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "clear", "sort", "reverse",
];
const DICT_MUTATING: &[&str] = &["update", "pop", "setdefault", "clear", "popitem"];
const SET_MUTATING: &[&str] = &["add", "discard", "remove", "pop", "clear", "update"];

/// Methods that change their receiver and must be written back to it.
pub(crate) fn mutates(receiver: &Value, method: &str) -> bool {
    match receiver {
        Value::List(_) => LIST_MUTATING.contains(&method),
        Value::Dict(_) => DICT_MUTATING.contains(&method),
        Value::Set(_) => SET_MUTATING.contains(&method),
        _ => false,
    }
}

pub(crate) fn get_attribute(value: &Value, attr: &str) -> Result<Value, ExecError> {
    let found = match value {
        Value::Module(m) => {
            return m.get(attr).cloned().ok_or_else(|| {
                ExecError::runtime(
                    "AttributeError",
                    format!("module '{}' has no attribute '{attr}'", m.name),
                )
            });
        }
        Value::Frame(df) => pandas::frame_attr(df, attr),
        Value::Series(s) => pandas::series_attr(s, attr),
        Value::Date(d) => datetime::date_attr(d, attr),
        Value::Error(e) if attr == "args" => Some(Value::tuple(vec![Value::str(e.message())])),
        _ => None,
    };
    found.ok_or_else(|| ExecError::attribute_error(value.type_name(), attr))
}

pub(crate) fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &mut Value,
    method: &str,
    args: CallArgs,
) -> Result<Value, ExecError> {
    let result = match receiver {
        Value::Str(s) => str_method(s, method, &args)?,
        Value::List(items) => list_method(interp, items, method, args)?,
        Value::Tuple(items) => sequence_method(items, method, &args)?,
        Value::Dict(d) => dict_method(d, method, args)?,
        Value::Set(set) => set_method(set, method, &args)?,
        Value::Frame(df) => pandas::frame_method(interp, df, method, &args)?,
        Value::Series(s) => pandas::series_method(interp, s, method, &args)?,
        Value::Date(d) => datetime::date_method(d, method, &args)?,
        Value::Figure(fig) => pyplot::figure_method(interp, fig, method, &args)?,
        _ => None,
    };
    result.ok_or_else(|| ExecError::attribute_error(receiver.type_name(), method))
}

/* ───────────────────────── str ───────────────────────── */

fn str_arg<'v>(args: &'v CallArgs, method: &str, i: usize, name: &str) -> Result<&'v str, ExecError> {
    let v = args.require(method, i, name)?;
    v.as_str().ok_or_else(|| {
        ExecError::type_error(format!(
            "{method}() argument must be str, not {}",
            v.type_name()
        ))
    })
}

fn affix_matches(s: &str, args: &CallArgs, method: &str, f: fn(&str, &str) -> bool) -> Result<bool, ExecError> {
    match args.require(method, 0, "prefix")? {
        Value::Str(p) => Ok(f(s, p)),
        Value::Tuple(options) => Ok(options.iter().any(|o| o.as_str().is_some_and(|p| f(s, p)))),
        other => Err(ExecError::type_error(format!(
            "{method} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn str_method(s: &str, method: &str, args: &CallArgs) -> Result<Option<Value>, ExecError> {
    let strip_chars = |i: usize| args.string(i, "chars");
    let v = match method {
        "upper" => Value::str(s.to_uppercase()),
        "lower" => Value::str(s.to_lowercase()),
        "strip" => match strip_chars(0) {
            Some(cs) => Value::str(s.trim_matches(|c| cs.contains(c))),
            None => Value::str(s.trim()),
        },
        "lstrip" => match strip_chars(0) {
            Some(cs) => Value::str(s.trim_start_matches(|c| cs.contains(c))),
            None => Value::str(s.trim_start()),
        },
        "rstrip" => match strip_chars(0) {
            Some(cs) => Value::str(s.trim_end_matches(|c| cs.contains(c))),
            None => Value::str(s.trim_end()),
        },
        "split" => {
            let max = args.int("split", 1, "maxsplit", -1)?;
            let parts: Vec<Value> = match args.get(0, "sep") {
                None | Some(Value::None) => {
                    let words = s.split_whitespace();
                    if max >= 0 {
                        let mut parts: Vec<String> = Vec::new();
                        let mut rest = s.trim_start();
                        while parts.len() < max as usize {
                            match rest.find(char::is_whitespace) {
                                Some(at) => {
                                    parts.push(rest[..at].to_string());
                                    rest = rest[at..].trim_start();
                                }
                                None => break,
                            }
                        }
                        if !rest.is_empty() {
                            parts.push(rest.to_string());
                        }
                        parts.into_iter().map(Value::from).collect()
                    } else {
                        words.map(Value::from).collect()
                    }
                }
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(ExecError::value_error("empty separator"));
                }
                Some(Value::Str(sep)) => {
                    if max >= 0 {
                        s.splitn(max as usize + 1, &**sep).map(Value::from).collect()
                    } else {
                        s.split(&**sep).map(Value::from).collect()
                    }
                }
                Some(other) => {
                    return Err(ExecError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Value::list(parts)
        }
        "splitlines" => Value::list(s.lines().map(Value::from).collect()),
        "join" => {
            let parts = items::iterate(args.require("join", 0, "iterable")?)?;
            let mut out = Vec::with_capacity(parts.len());
            for (i, p) in parts.iter().enumerate() {
                match p {
                    Value::Str(t) => out.push(t.to_string()),
                    other => {
                        return Err(ExecError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            Value::str(out.join(s))
        }
        "replace" => {
            let old = str_arg(args, "replace", 0, "old")?;
            let new = str_arg(args, "replace", 1, "new")?;
            let count = args.int("replace", 2, "count", -1)?;
            if count < 0 {
                Value::str(s.replace(old, new))
            } else {
                Value::str(s.replacen(old, new, count as usize))
            }
        }
        "startswith" => Value::Bool(affix_matches(s, args, "startswith", |s, p| s.starts_with(p))?),
        "endswith" => Value::Bool(affix_matches(s, args, "endswith", |s, p| s.ends_with(p))?),
        "find" => {
            let needle = str_arg(args, "find", 0, "sub")?;
            Value::Int(
                s.find(needle)
                    .map(|byte| s[..byte].chars().count() as i64)
                    .unwrap_or(-1),
            )
        }
        "count" => {
            let needle = str_arg(args, "count", 0, "sub")?;
            if needle.is_empty() {
                Value::Int(s.chars().count() as i64 + 1)
            } else {
                Value::Int(s.matches(needle).count() as i64)
            }
        }
        "format" => Value::str(format::format_template(s, args)?),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut start = true;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    start = false;
                } else {
                    out.push(c);
                    start = true;
                }
            }
            Value::str(out)
        }
        "capitalize" => {
            let mut chars = s.chars();
            Value::str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "isdigit" | "isnumeric" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isspace" => Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace)),
        "zfill" => {
            let width = ops::repeated_len(1, args.int("zfill", 0, "width", 0)?)?;
            let len = s.chars().count();
            if len >= width {
                Value::str(s)
            } else {
                let (sign, digits) = match s.strip_prefix(['-', '+']) {
                    Some(rest) => (&s[..1], rest),
                    None => ("", s),
                };
                Value::str(format!("{sign}{}{digits}", "0".repeat(width - len)))
            }
        }
        "ljust" | "rjust" | "center" => {
            let width = ops::repeated_len(1, args.int(method, 0, "width", 0)?)?;
            let fill = args.string(1, "fillchar").and_then(|f| f.chars().next()).unwrap_or(' ');
            let len = s.chars().count();
            let gap = width.saturating_sub(len);
            let pad = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
            Value::str(match method {
                "ljust" => format!("{s}{}", pad(gap)),
                "rjust" => format!("{}{s}", pad(gap)),
                _ => format!("{}{s}{}", pad(gap / 2), pad(gap - gap / 2)),
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

/* ──────────────────────── sequences ──────────────────────── */

fn sequence_method(items: &[Value], method: &str, args: &CallArgs) -> Result<Option<Value>, ExecError> {
    Ok(Some(match method {
        "count" => {
            let x = args.require("count", 0, "value")?;
            Value::Int(items.iter().filter(|v| v.py_eq(x)).count() as i64)
        }
        "index" => {
            let x = args.require("index", 0, "value")?;
            let at = items.iter().position(|v| v.py_eq(x)).ok_or_else(|| {
                ExecError::value_error(format!("{} is not in list", x.repr()))
            })?;
            Value::Int(at as i64)
        }
        _ => return Ok(None),
    }))
}

fn list_method(
    interp: &mut Interpreter<'_>,
    list: &mut Rc<Vec<Value>>,
    method: &str,
    args: CallArgs,
) -> Result<Option<Value>, ExecError> {
    let v = match method {
        "append" => {
            args.exactly("append", 1)?;
            Rc::make_mut(list).push(args.positional[0].clone());
            Value::None
        }
        "extend" => {
            let more = items::iterate(args.require("extend", 0, "iterable")?)?;
            Rc::make_mut(list).extend(more);
            Value::None
        }
        "insert" => {
            let at = args.int("insert", 0, "index", 0)?;
            let x = args.require("insert", 1, "object")?.clone();
            let len = list.len() as i64;
            let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
            Rc::make_mut(list).insert(at as usize, x);
            Value::None
        }
        "pop" => {
            if list.is_empty() {
                return Err(ExecError::index_error("pop from empty list"));
            }
            let len = list.len() as i64;
            let at = args.int("pop", 0, "index", -1)?;
            let at = if at < 0 { at + len } else { at };
            if !(0..len).contains(&at) {
                return Err(ExecError::index_error("pop index out of range"));
            }
            Rc::make_mut(list).remove(at as usize)
        }
        "remove" => {
            let x = args.require("remove", 0, "value")?;
            let at = list.iter().position(|v| v.py_eq(x)).ok_or_else(|| {
                ExecError::value_error("list.remove(x): x not in list")
            })?;
            Rc::make_mut(list).remove(at);
            Value::None
        }
        "clear" => {
            Rc::make_mut(list).clear();
            Value::None
        }
        "reverse" => {
            Rc::make_mut(list).reverse();
            Value::None
        }
        "sort" => {
            let reverse = args.keyword("reverse").is_some_and(Value::is_truthy);
            let key = args.keyword("key").cloned();
            sort_values(interp, Rc::make_mut(list), key.as_ref(), reverse)?;
            Value::None
        }
        "copy" => Value::list(list.as_ref().clone()),
        _ => return sequence_method(list, method, &args),
    };
    Ok(Some(v))
}

/* ───────────────────────── dict ───────────────────────── */

fn dict_method(d: &mut Rc<Dict>, method: &str, args: CallArgs) -> Result<Option<Value>, ExecError> {
    let v = match method {
        "get" => {
            let key = args.require("get", 0, "key")?;
            d.get(key)
                .cloned()
                .unwrap_or_else(|| args.get(1, "default").cloned().unwrap_or(Value::None))
        }
        "keys" => Value::list(d.keys().cloned().collect()),
        "values" => Value::list(d.values().cloned().collect()),
        "items" => Value::list(
            d.iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        ),
        "copy" => Value::Dict(Rc::new(d.as_ref().clone())),
        "update" => {
            let target = Rc::make_mut(d);
            if let Some(source) = args.positional.first() {
                match source {
                    Value::Dict(other) => {
                        for (k, v) in other.iter() {
                            target.insert(k.clone(), v.clone());
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
                            target.insert(k, v);
                        }
                    }
                }
            }
            for (k, v) in args.keywords {
                target.insert(Value::str(k), v);
            }
            Value::None
        }
        "pop" => {
            let key = args.require("pop", 0, "key")?;
            match Rc::make_mut(d).remove(key) {
                Some(v) => v,
                None => args
                    .get(1, "default")
                    .cloned()
                    .ok_or_else(|| ExecError::key_error(key.repr()))?,
            }
        }
        "popitem" => {
            let last = d.keys().last().cloned().ok_or_else(|| {
                ExecError::key_error("'popitem(): dictionary is empty'")
            })?;
            let value = Rc::make_mut(d).remove(&last).unwrap_or(Value::None);
            Value::tuple(vec![last, value])
        }
        "setdefault" => {
            let key = args.require("setdefault", 0, "key")?.clone();
            match d.get(&key) {
                Some(v) => v.clone(),
                None => {
                    let default = args.get(1, "default").cloned().unwrap_or(Value::None);
                    Rc::make_mut(d).insert(key, default.clone());
                    default
                }
            }
        }
        "clear" => {
            Rc::make_mut(d).clear();
            Value::None
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

/* ───────────────────────── set ───────────────────────── */

fn set_arg(args: &CallArgs, method: &str) -> Result<Set, ExecError> {
    let other = args.require(method, 0, "other")?;
    if let Value::Set(set) = other {
        return Ok(set.as_ref().clone());
    }
    let mut set = Set::new();
    for item in items::iterate(other)? {
        items::hashable(&item)?;
        set.insert(item);
    }
    Ok(set)
}

fn set_method(set: &mut Rc<Set>, method: &str, args: &CallArgs) -> Result<Option<Value>, ExecError> {
    let v = match method {
        "add" => {
            let item = args.require("add", 0, "elem")?;
            items::hashable(item)?;
            Rc::make_mut(set).insert(item.clone());
            Value::None
        }
        "discard" => {
            Rc::make_mut(set).remove(args.require("discard", 0, "elem")?);
            Value::None
        }
        "remove" => {
            let item = args.require("remove", 0, "elem")?;
            if !Rc::make_mut(set).remove(item) {
                return Err(ExecError::key_error(item.repr()));
            }
            Value::None
        }
        "pop" => Rc::make_mut(set)
            .pop()
            .ok_or_else(|| ExecError::key_error("'pop from an empty set'"))?,
        "clear" => {
            Rc::make_mut(set).clear();
            Value::None
        }
        "update" => {
            let more = set_arg(args, "update")?;
            let target = Rc::make_mut(set);
            for item in more.iter() {
                target.insert(item.clone());
            }
            Value::None
        }
        "union" => Value::set(set.union(&set_arg(args, "union")?)),
        "intersection" => Value::set(set.intersection(&set_arg(args, "intersection")?)),
        "difference" => Value::set(set.difference(&set_arg(args, "difference")?)),
        "symmetric_difference" => {
            Value::set(set.symmetric_difference(&set_arg(args, "symmetric_difference")?))
        }
        "issubset" => Value::Bool(set.is_subset(&set_arg(args, "issubset")?)),
        "issuperset" => Value::Bool(set_arg(args, "issuperset")?.is_subset(set)),
        "isdisjoint" => Value::Bool(set.intersection(&set_arg(args, "isdisjoint")?).is_empty()),
        "copy" => Value::set(set.as_ref().clone()),
        _ => return Ok(None),
    };
    Ok(Some(v))
}
