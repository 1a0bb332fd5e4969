//! `pandas` shim: column-major frames and labelled series with the subset of
//! the API fragments typically use to shape a spreadsheet result.

use std::cmp::Ordering;
use std::rc::Rc;

use pycell_common::{DataFrame, Dict, ExecError, Module, Series, Value};
use pycell_parse::ast::Operator;

use super::datetime::parse_iso;
use super::pyplot;
use crate::args::{CallArgs, number};
use crate::builtins::Builtin;
use crate::interpreter::{Interpreter, items, ops};

const DESCRIBE_ROWS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

pub(crate) fn module() -> Value {
    Value::Module(Rc::new(
        Module::new("pandas")
            .with("DataFrame", Builtin::value("DataFrame", data_frame))
            .with("Series", Builtin::value("Series", series))
            .with("to_datetime", Builtin::value("to_datetime", to_datetime)),
    ))
}

fn optional<'v>(args: &'v CallArgs, i: usize, name: &str) -> Option<&'v Value> {
    args.get(i, name).filter(|v| !v.is_none())
}

fn length_mismatch(values: usize, index: usize) -> ExecError {
    ExecError::value_error(format!(
        "Length of values ({values}) does not match length of index ({index})"
    ))
}

/* ──────────────────────── construction ──────────────────────── */

/// `DataFrame(data=None, index=None, columns=None)`.
fn data_frame(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("DataFrame", 3)?;
    let index = optional(&args, 1, "index").map(items::iterate).transpose()?;
    let columns: Option<Vec<String>> = optional(&args, 2, "columns")
        .map(|v| items::iterate(v).map(|cols| cols.iter().map(Value::to_string).collect()))
        .transpose()?;

    let mut df = match optional(&args, 0, "data") {
        None => {
            let names = columns.clone().unwrap_or_default();
            let rows = index.as_ref().map_or(0, Vec::len);
            let data = vec![vec![Value::None; rows]; names.len()];
            DataFrame::new(names, data)?
        }
        Some(Value::Dict(d)) => from_dict(d, columns.as_deref(), index.as_ref().map(Vec::len))?,
        Some(Value::Frame(f)) => match &columns {
            Some(names) => select_columns(f, names)?,
            None => f.as_ref().clone(),
        },
        Some(Value::Series(s)) => {
            let name = s.name.clone().unwrap_or_else(|| "0".to_string());
            let mut df = DataFrame::new(vec![name], vec![s.values.clone()])?;
            df.index = s.index.clone();
            df
        }
        Some(other) => from_rows(&items::iterate(other)?, columns.as_deref())?,
    };
    if let Some(index) = index {
        if index.len() != df.n_rows() && df.n_cols() > 0 {
            return Err(length_mismatch(df.n_rows(), index.len()));
        }
        df.index = Some(index);
    }
    Ok(Value::Frame(Rc::new(df)))
}

fn from_dict(d: &Dict, columns: Option<&[String]>, index_len: Option<usize>) -> Result<DataFrame, ExecError> {
    let mut names = Vec::with_capacity(d.len());
    let mut raw: Vec<Option<Vec<Value>>> = Vec::with_capacity(d.len());
    for (k, v) in d.iter() {
        names.push(k.to_string());
        raw.push(match v {
            Value::List(items) | Value::Tuple(items) => Some(items.as_ref().clone()),
            Value::Series(s) => Some(s.values.clone()),
            _ => None,
        });
    }
    let rows = match raw.iter().flatten().next() {
        Some(first) => first.len(),
        None if d.is_empty() => index_len.unwrap_or(0),
        None => index_len.ok_or_else(|| {
            ExecError::value_error("If using all scalar values, you must pass an index")
        })?,
    };
    let data: Vec<Vec<Value>> = raw
        .into_iter()
        .zip(d.values())
        .map(|(col, scalar)| col.unwrap_or_else(|| vec![scalar.clone(); rows]))
        .collect();
    let df = DataFrame::new(names, data)?;
    match columns {
        Some(wanted) => select_columns(&df, wanted),
        None => Ok(df),
    }
}

fn from_rows(rows: &[Value], columns: Option<&[String]>) -> Result<DataFrame, ExecError> {
    if !rows.is_empty() && rows.iter().all(|r| matches!(r, Value::Dict(_))) {
        let mut names: Vec<Value> = Vec::new();
        for row in rows {
            if let Value::Dict(d) = row {
                for k in d.keys() {
                    if !names.iter().any(|n| n.py_eq(k)) {
                        names.push(k.clone());
                    }
                }
            }
        }
        let data = names
            .iter()
            .map(|name| {
                rows.iter()
                    .map(|row| match row {
                        Value::Dict(d) => d.get(name).cloned().unwrap_or(Value::None),
                        _ => Value::None,
                    })
                    .collect()
            })
            .collect();
        let df = DataFrame::new(names.iter().map(Value::to_string).collect(), data)?;
        return match columns {
            Some(wanted) => select_columns(&df, wanted),
            None => Ok(df),
        };
    }

    let cells: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| match row {
            Value::List(items) | Value::Tuple(items) => items.as_ref().clone(),
            other => vec![other.clone()],
        })
        .collect();
    let width = match (cells.iter().map(Vec::len).max(), columns) {
        (Some(w), _) => w,
        (None, Some(names)) => names.len(),
        (None, None) => 0,
    };
    let names: Vec<String> = match columns {
        Some(names) if names.len() != width => {
            return Err(ExecError::value_error(format!(
                "{} columns passed, passed data had {width} columns",
                names.len()
            )));
        }
        Some(names) => names.to_vec(),
        None => (0..width).map(|i| i.to_string()).collect(),
    };
    let data = (0..width)
        .map(|c| {
            cells
                .iter()
                .map(|row| row.get(c).cloned().unwrap_or(Value::None))
                .collect()
        })
        .collect();
    DataFrame::new(names, data)
}

fn select_columns(df: &DataFrame, names: &[String]) -> Result<DataFrame, ExecError> {
    let data = names
        .iter()
        .map(|name| match df.column(name) {
            Some(col) => col.to_vec(),
            None => vec![Value::None; df.n_rows()],
        })
        .collect();
    let mut out = DataFrame::new(names.to_vec(), data)?;
    out.index = df.index.clone();
    out.show_header = df.show_header;
    out.show_index = df.show_index;
    Ok(out)
}

/// `Series(data=None, index=None, name=None)`.
fn series(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("Series", 3)?;
    let index = optional(&args, 1, "index").map(items::iterate).transpose()?;
    let name = optional(&args, 2, "name").map(Value::to_string);
    let mut s = match optional(&args, 0, "data") {
        None => Series::new(Vec::new()),
        Some(Value::Dict(d)) => Series {
            name: None,
            index: Some(d.keys().cloned().collect()),
            values: d.values().cloned().collect(),
        },
        Some(Value::Series(s)) => s.as_ref().clone(),
        Some(v) if v.is_scalar() => {
            let n = index.as_ref().map_or(1, Vec::len);
            Series::new(vec![v.clone(); n])
        }
        Some(other) => Series::new(items::iterate(other)?),
    };
    if let Some(index) = index {
        if index.len() != s.len() {
            return Err(length_mismatch(s.len(), index.len()));
        }
        s.index = Some(index);
    }
    if name.is_some() {
        s.name = name;
    }
    Ok(Value::Series(Rc::new(s)))
}

fn to_date(v: &Value) -> Result<Value, ExecError> {
    match v {
        Value::Str(s) => Ok(Value::Date(parse_iso(s)?)),
        Value::Date(_) | Value::None => Ok(v.clone()),
        other => Err(ExecError::type_error(format!(
            "<class '{}'> is not convertible to datetime",
            other.type_name()
        ))),
    }
}

fn to_datetime(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("to_datetime", 1)?;
    match &args.positional[0] {
        Value::Series(s) => {
            let values = s.values.iter().map(to_date).collect::<Result<_, _>>()?;
            Ok(Value::Series(Rc::new(Series {
                values,
                ..s.as_ref().clone()
            })))
        }
        Value::List(items) | Value::Tuple(items) => {
            let values = items.iter().map(to_date).collect::<Result<_, _>>()?;
            Ok(Value::Series(Rc::new(Series::new(values))))
        }
        scalar => to_date(scalar),
    }
}

/* ─────────────────────────── statistics ─────────────────────────── */

fn present(values: &[Value]) -> impl Iterator<Item = &Value> {
    values
        .iter()
        .filter(|v| !v.is_none() && !matches!(v, Value::Float(f) if f.is_nan()))
}

fn is_numeric_column(values: &[Value]) -> bool {
    let mut seen = false;
    let all = present(values).all(|v| {
        seen = true;
        v.is_numeric()
    });
    all && seen
}

fn floats(func: &str, values: &[Value]) -> Result<Vec<f64>, ExecError> {
    present(values)
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                ExecError::type_error(format!(
                    "Could not convert {} to numeric in {func}()",
                    v.repr()
                ))
            })
        })
        .collect()
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn mean_of(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        f64::NAN
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Sample standard deviation.
fn std_of(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean_of(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

fn extreme(values: &[Value], want: Ordering) -> Result<Value, ExecError> {
    let mut best: Option<&Value> = None;
    for v in present(values) {
        best = match best {
            None => Some(v),
            Some(b) if ops::order(v, b, "<")? == Some(want) => Some(v),
            keep => keep,
        };
    }
    Ok(best.cloned().unwrap_or(Value::Float(f64::NAN)))
}

/// One reduction over a column; `None` when `func` is not a reduction.
fn aggregate(func: &str, values: &[Value]) -> Result<Option<Value>, ExecError> {
    let v = match func {
        "sum" => {
            let mut acc = Value::Int(0);
            for v in present(values) {
                acc = ops::binary_op(Operator::Add, &acc, v)?;
            }
            acc
        }
        "count" => Value::Int(present(values).count() as i64),
        "min" => extreme(values, Ordering::Less)?,
        "max" => extreme(values, Ordering::Greater)?,
        "mean" => Value::Float(mean_of(&floats(func, values)?)),
        "std" => Value::Float(std_of(&floats(func, values)?)),
        "median" => {
            let mut xs = floats(func, values)?;
            xs.sort_by(f64::total_cmp);
            Value::Float(quantile(&xs, 0.5))
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn describe_column(values: &[Value]) -> Result<Vec<Value>, ExecError> {
    let mut xs = floats("describe", values)?;
    xs.sort_by(f64::total_cmp);
    let min = xs.first().copied().unwrap_or(f64::NAN);
    let max = xs.last().copied().unwrap_or(f64::NAN);
    Ok([
        xs.len() as f64,
        mean_of(&xs),
        std_of(&xs),
        min,
        quantile(&xs, 0.25),
        quantile(&xs, 0.5),
        quantile(&xs, 0.75),
        max,
    ]
    .into_iter()
    .map(Value::Float)
    .collect())
}

/// Stable order of `values`, missing values last.
fn argsort(values: &[Value], ascending: bool) -> Result<Vec<usize>, ExecError> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| {
        let (x, y) = (&values[a], &values[b]);
        match (x.is_none(), y.is_none()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match ops::order(x, y, "<") {
            Ok(Some(o)) if ascending => o,
            Ok(Some(o)) => o.reverse(),
            Ok(None) => Ordering::Equal,
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(order),
    }
}

fn head_rows(len: usize, n: i64) -> Vec<usize> {
    let n = if n < 0 { (len as i64 + n).max(0) } else { n.min(len as i64) };
    (0..n as usize).collect()
}

fn tail_rows(len: usize, n: i64) -> Vec<usize> {
    let n = if n < 0 { (len as i64 + n).max(0) } else { n.min(len as i64) } as usize;
    (len - n..len).collect()
}

fn round_value(v: &Value, decimals: i64) -> Value {
    match v {
        Value::Float(x) => {
            let scale = 10f64.powi(decimals as i32);
            Value::Float((x * scale).round_ties_even() / scale)
        }
        other => other.clone(),
    }
}

/* ──────────────────────────── frames ──────────────────────────── */

pub(crate) fn frame_attr(df: &DataFrame, attr: &str) -> Option<Value> {
    Some(match attr {
        "shape" => {
            let (r, c) = df.shape();
            Value::tuple(vec![Value::Int(r as i64), Value::Int(c as i64)])
        }
        "columns" => Value::list(df.columns.iter().map(Value::str).collect()),
        "index" => Value::list(df.index_labels()),
        "values" => Value::list((0..df.n_rows()).map(|r| Value::list(df.row(r))).collect()),
        "empty" => Value::Bool(df.n_rows() == 0 || df.n_cols() == 0),
        "size" => Value::Int((df.n_rows() * df.n_cols()) as i64),
        name => Value::Series(Rc::new(items::frame_column(df, name).ok()?)),
    })
}

fn frame_reduce(df: &DataFrame, func: &str) -> Result<Option<Value>, ExecError> {
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for (name, col) in df.columns.iter().zip(&df.data) {
        if func != "count" && !is_numeric_column(col) {
            continue;
        }
        match aggregate(func, col)? {
            Some(v) => {
                labels.push(Value::str(name));
                values.push(v);
            }
            None => return Ok(None),
        }
    }
    if values.is_empty() && aggregate(func, &[])?.is_none() {
        return Ok(None);
    }
    Ok(Some(Value::Series(Rc::new(Series {
        name: None,
        index: Some(labels),
        values,
    }))))
}

fn describe_frame(df: &DataFrame) -> Result<DataFrame, ExecError> {
    let mut columns = vec![String::new()];
    let mut label_col = vec![Value::str("")];
    label_col.extend(DESCRIBE_ROWS.iter().map(|l| Value::str(*l)));
    let mut data = vec![label_col];
    for (name, col) in df.columns.iter().zip(&df.data) {
        if !is_numeric_column(col) {
            continue;
        }
        let mut out = vec![Value::str(name)];
        out.extend(describe_column(col)?);
        columns.push(name.clone());
        data.push(out);
    }
    if data.len() == 1 {
        return Err(ExecError::value_error("Cannot describe a DataFrame without numeric columns"));
    }
    let mut described = DataFrame::new(columns, data)?;
    described.show_header = false;
    described.show_index = false;
    described.described = true;
    Ok(described)
}

fn drop_frame(df: &DataFrame, args: &CallArgs) -> Result<DataFrame, ExecError> {
    let names = |v: &Value| -> Result<Vec<Value>, ExecError> {
        match v {
            Value::List(_) | Value::Tuple(_) => items::iterate(v),
            other => Ok(vec![other.clone()]),
        }
    };
    let axis_columns = matches!(args.keyword("axis"), Some(Value::Int(1)))
        || matches!(args.keyword("axis"), Some(Value::Str(s)) if &**s == "columns");
    if let Some(cols) = args.keyword("columns").or(args.positional.first().filter(|_| axis_columns)) {
        let drop = names(cols)?;
        let mut keep = Vec::new();
        for d in &drop {
            let name = d.to_string();
            if df.column(&name).is_none() {
                return Err(ExecError::key_error(format!("\"['{name}'] not found in axis\"")));
            }
        }
        for name in &df.columns {
            if !drop.iter().any(|d| d.to_string() == *name) {
                keep.push(name.clone());
            }
        }
        return select_columns(df, &keep);
    }
    let labels = match args.keyword("index").or(args.positional.first()) {
        Some(v) => names(v)?,
        None => return Ok(df.clone()),
    };
    let all = df.index_labels();
    for l in &labels {
        if !all.iter().any(|a| a.py_eq(l)) {
            return Err(ExecError::key_error(format!("\"[{}] not found in axis\"", l.repr())));
        }
    }
    let rows: Vec<usize> = (0..df.n_rows())
        .filter(|&r| !labels.iter().any(|l| l.py_eq(&all[r])))
        .collect();
    Ok(items::select_rows(df, &rows))
}

fn to_dict(df: &DataFrame, orient: &str) -> Result<Value, ExecError> {
    let labels = df.index_labels();
    let mut out = Dict::new();
    match orient {
        "dict" => {
            for (name, col) in df.columns.iter().zip(&df.data) {
                let inner: Dict = labels.iter().cloned().zip(col.iter().cloned()).collect();
                out.insert(Value::str(name), Value::dict(inner));
            }
        }
        "list" => {
            for (name, col) in df.columns.iter().zip(&df.data) {
                out.insert(Value::str(name), Value::list(col.clone()));
            }
        }
        "records" => {
            let rows = (0..df.n_rows())
                .map(|r| {
                    let row: Dict = df
                        .columns
                        .iter()
                        .map(Value::str)
                        .zip(df.row(r))
                        .collect();
                    Value::dict(row)
                })
                .collect();
            return Ok(Value::list(rows));
        }
        other => {
            return Err(ExecError::value_error(format!(
                "orient '{other}' not understood"
            )));
        }
    }
    Ok(Value::dict(out))
}

pub(crate) fn frame_method(
    interp: &mut Interpreter<'_>,
    df: &DataFrame,
    method: &str,
    args: &CallArgs,
) -> Result<Option<Value>, ExecError> {
    if let Some(reduced) = frame_reduce(df, method)? {
        return Ok(Some(reduced));
    }
    let frame = |df: DataFrame| Some(Value::Frame(Rc::new(df)));
    Ok(match method {
        "head" => frame(items::select_rows(df, &head_rows(df.n_rows(), args.int("head", 0, "n", 5)?))),
        "tail" => frame(items::select_rows(df, &tail_rows(df.n_rows(), args.int("tail", 0, "n", 5)?))),
        "copy" => frame(df.clone()),
        "describe" => frame(describe_frame(df)?),
        "display" => {
            let mut out = df.clone();
            out.show_index = args.flag(usize::MAX, "index", df.show_index);
            out.show_header = args.flag(usize::MAX, "header", df.show_header);
            frame(out)
        }
        "sort_values" => {
            let by = args
                .string(0, "by")
                .ok_or_else(|| ExecError::type_error("sort_values() missing required argument: 'by'"))?;
            let key = df
                .column(&by)
                .ok_or_else(|| ExecError::key_error(format!("'{by}'")))?;
            let order = argsort(key, args.flag(1, "ascending", true))?;
            frame(items::select_rows(df, &order))
        }
        "reset_index" => {
            let mut out = df.clone();
            if !args.flag(usize::MAX, "drop", false) {
                out.columns.insert(0, "index".to_string());
                out.data.insert(0, df.index_labels());
            }
            out.index = None;
            frame(out)
        }
        "set_index" => {
            let key = args
                .string(0, "keys")
                .ok_or_else(|| ExecError::type_error("set_index() missing required argument: 'keys'"))?;
            let at = df
                .columns
                .iter()
                .position(|c| *c == key)
                .ok_or_else(|| ExecError::key_error(format!("\"None of ['{key}'] are in the columns\"")))?;
            let mut out = df.clone();
            out.columns.remove(at);
            out.index = Some(out.data.remove(at));
            frame(out)
        }
        "rename" => {
            let mut out = df.clone();
            if let Some(Value::Dict(mapping)) = args.keyword("columns") {
                for name in out.columns.iter_mut() {
                    if let Some(new) = mapping.get(&Value::str(name.as_str())) {
                        *name = new.to_string();
                    }
                }
            }
            frame(out)
        }
        "drop" => frame(drop_frame(df, args)?),
        "fillna" => {
            let fill = args.require("fillna", 0, "value")?;
            let mut out = df.clone();
            for cell in out.data.iter_mut().flatten() {
                if cell.is_none() {
                    *cell = fill.clone();
                }
            }
            frame(out)
        }
        "dropna" => {
            let rows: Vec<usize> = (0..df.n_rows())
                .filter(|&r| df.data.iter().all(|col| !col[r].is_none()))
                .collect();
            frame(items::select_rows(df, &rows))
        }
        "round" => {
            let decimals = args.int("round", 0, "decimals", 0)?;
            let mut out = df.clone();
            for cell in out.data.iter_mut().flatten() {
                *cell = round_value(cell, decimals);
            }
            frame(out)
        }
        "to_dict" => Some(to_dict(df, args.string(0, "orient").as_deref().unwrap_or("dict"))?),
        "plot" => {
            let kind = args.string(usize::MAX, "kind").unwrap_or_else(|| "line".to_string());
            let traces = df.data.iter().filter(|c| is_numeric_column(c)).count().max(1);
            Some(pyplot::record(interp.effects, &kind, traces, args.string(usize::MAX, "title")))
        }
        _ => None,
    })
}

/* ──────────────────────────── series ──────────────────────────── */

pub(crate) fn series_attr(s: &Series, attr: &str) -> Option<Value> {
    Some(match attr {
        "name" => s.name.as_deref().map(Value::str).unwrap_or(Value::None),
        "index" => Value::list(s.index_labels()),
        "values" => Value::list(s.values.clone()),
        "shape" => Value::tuple(vec![Value::Int(s.len() as i64)]),
        "size" => Value::Int(s.len() as i64),
        "empty" => Value::Bool(s.is_empty()),
        _ => return None,
    })
}

fn map_values(
    interp: &mut Interpreter<'_>,
    s: &Series,
    func: &Value,
) -> Result<Series, ExecError> {
    let values = match func {
        Value::Dict(mapping) => s
            .values
            .iter()
            .map(|v| mapping.get(v).cloned().unwrap_or(Value::None))
            .collect(),
        f => s
            .values
            .iter()
            .map(|v| interp.call(f, CallArgs::new([v.clone()])))
            .collect::<Result<_, _>>()?,
    };
    Ok(Series {
        values,
        ..s.clone()
    })
}

pub(crate) fn series_method(
    interp: &mut Interpreter<'_>,
    s: &Series,
    method: &str,
    args: &CallArgs,
) -> Result<Option<Value>, ExecError> {
    if let Some(v) = aggregate(method, &s.values)? {
        return Ok(Some(v));
    }
    let series = |s: Series| Some(Value::Series(Rc::new(s)));
    Ok(match method {
        "head" => series(items::select_series(s, &head_rows(s.len(), args.int("head", 0, "n", 5)?))),
        "tail" => series(items::select_series(s, &tail_rows(s.len(), args.int("tail", 0, "n", 5)?))),
        "copy" => series(s.clone()),
        "tolist" | "to_list" => Some(Value::list(s.values.clone())),
        "describe" => series(Series {
            name: s.name.clone(),
            index: Some(DESCRIBE_ROWS.iter().map(|l| Value::str(*l)).collect()),
            values: describe_column(&s.values)?,
        }),
        "sort_values" => {
            let order = argsort(&s.values, args.flag(usize::MAX, "ascending", true))?;
            series(items::select_series(s, &order))
        }
        "unique" => {
            let mut seen: Vec<Value> = Vec::new();
            for v in &s.values {
                if !seen.iter().any(|u| u.py_eq(v)) {
                    seen.push(v.clone());
                }
            }
            Some(Value::list(seen))
        }
        "value_counts" => {
            let mut counts: Vec<(Value, i64)> = Vec::new();
            for v in present(&s.values) {
                match counts.iter_mut().find(|(u, _)| u.py_eq(v)) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((v.clone(), 1)),
                }
            }
            counts.sort_by(|a, b| b.1.cmp(&a.1));
            series(Series {
                name: Some("count".to_string()),
                index: Some(counts.iter().map(|(v, _)| v.clone()).collect()),
                values: counts.into_iter().map(|(_, n)| Value::Int(n)).collect(),
            })
        }
        "apply" | "map" => {
            let func = args.require(method, 0, "func")?;
            series(map_values(interp, s, func)?)
        }
        "round" => {
            let decimals = args.int("round", 0, "decimals", 0)?;
            series(Series {
                values: s.values.iter().map(|v| round_value(v, decimals)).collect(),
                ..s.clone()
            })
        }
        "abs" => {
            let values = s
                .values
                .iter()
                .map(|v| match v {
                    Value::None => Ok(Value::None),
                    v => number("abs", v).map(|x| match v {
                        Value::Int(i) => Value::Int(i.abs()),
                        _ => Value::Float(x.abs()),
                    }),
                })
                .collect::<Result<_, _>>()?;
            series(Series { values, ..s.clone() })
        }
        "cumsum" => {
            let mut acc = Value::Int(0);
            let mut values = Vec::with_capacity(s.len());
            for v in &s.values {
                if v.is_none() {
                    values.push(Value::None);
                    continue;
                }
                acc = ops::binary_op(Operator::Add, &acc, v)?;
                values.push(acc.clone());
            }
            series(Series { values, ..s.clone() })
        }
        "idxmax" | "idxmin" => {
            let want = if method == "idxmax" { Ordering::Greater } else { Ordering::Less };
            let best = extreme(&s.values, want)?;
            let at = s.values.iter().position(|v| v.py_eq(&best)).ok_or_else(|| {
                ExecError::value_error(format!("attempt to get {method} of an empty sequence"))
            })?;
            Some(s.index_labels()[at].clone())
        }
        "rename" => series(Series {
            name: optional(args, 0, "index").map(Value::to_string),
            ..s.clone()
        }),
        "to_frame" => {
            let name = optional(args, 0, "name")
                .map(Value::to_string)
                .or_else(|| s.name.clone())
                .unwrap_or_else(|| "0".to_string());
            let mut df = DataFrame::new(vec![name], vec![s.values.clone()])?;
            df.index = s.index.clone();
            Some(Value::Frame(Rc::new(df)))
        }
        "fillna" => {
            let fill = args.require("fillna", 0, "value")?;
            series(Series {
                values: s
                    .values
                    .iter()
                    .map(|v| if v.is_none() { fill.clone() } else { v.clone() })
                    .collect(),
                ..s.clone()
            })
        }
        "dropna" => {
            let rows: Vec<usize> = (0..s.len()).filter(|&r| !s.values[r].is_none()).collect();
            series(items::select_series(s, &rows))
        }
        "plot" => {
            let kind = args.string(usize::MAX, "kind").unwrap_or_else(|| "line".to_string());
            Some(pyplot::record(interp.effects, &kind, 1, args.string(usize::MAX, "title")))
        }
        _ => None,
    })
}
