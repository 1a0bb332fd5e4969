//! Indexing, slicing and iteration over runtime values.

use std::rc::Rc;

use pycell_common::{DataFrame, ExecError, Series, Value};

pub(crate) fn hashable(key: &Value) -> Result<(), ExecError> {
    if key.is_hashable() {
        Ok(())
    } else {
        Err(ExecError::type_error(format!(
            "unhashable type: '{}'",
            key.type_name()
        )))
    }
}

/// Materialize the items an iteration over `v` yields.
pub(crate) fn iterate(v: &Value) -> Result<Vec<Value>, ExecError> {
    match v {
        Value::List(items) | Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Dict(d) => Ok(d.keys().cloned().collect()),
        Value::Set(set) => Ok(set.as_slice().to_vec()),
        Value::Series(s) => Ok(s.values.clone()),
        Value::Frame(df) => Ok(df.columns.iter().map(|c| Value::str(c)).collect()),
        other => Err(ExecError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

pub(crate) fn length(v: &Value) -> Result<usize, ExecError> {
    match v {
        Value::List(items) | Value::Tuple(items) => Ok(items.len()),
        Value::Str(s) => Ok(s.chars().count()),
        Value::Dict(d) => Ok(d.len()),
        Value::Set(set) => Ok(set.len()),
        Value::Series(s) => Ok(s.len()),
        Value::Frame(df) => Ok(df.n_rows()),
        other => Err(ExecError::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { i + len } else { i };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn int_index(index: &Value, what: &str) -> Result<i64, ExecError> {
    match index {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(ExecError::type_error(format!(
            "{what} indices must be integers, not {}",
            other.type_name()
        ))),
    }
}

/// Positions selected by `[lower:upper:step]` over a sequence of `len`.
pub(crate) fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, ExecError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ExecError::value_error("slice step cannot be zero"));
    }
    let n = len as i64;
    let mut out = Vec::new();
    if step > 0 {
        let clamp = |v: i64| if v < 0 { (v + n).max(0) } else { v.min(n) };
        let start = lower.map(clamp).unwrap_or(0);
        let stop = upper.map(clamp).unwrap_or(n);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let clamp = |v: i64| if v < 0 { (v + n).max(-1) } else { v.min(n - 1) };
        let start = lower.map(clamp).unwrap_or(n - 1);
        let stop = upper.map(clamp).unwrap_or(-1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

pub(crate) fn get_slice(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Value, ExecError> {
    match container {
        Value::List(items) => {
            let idx = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::list(idx.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let idx = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::tuple(idx.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = slice_indices(chars.len(), lower, upper, step)?;
            Ok(Value::str(idx.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::Series(s) => {
            let idx = slice_indices(s.len(), lower, upper, step)?;
            Ok(Value::Series(Rc::new(select_series(s, &idx))))
        }
        Value::Frame(df) => {
            let idx = slice_indices(df.n_rows(), lower, upper, step)?;
            Ok(Value::Frame(Rc::new(select_rows(df, &idx))))
        }
        other => Err(ExecError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub(crate) fn select_rows(df: &DataFrame, rows: &[usize]) -> DataFrame {
    let mut out = df.clone();
    out.data = df
        .data
        .iter()
        .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
        .collect();
    let labels = df.index_labels();
    out.index = Some(rows.iter().map(|&r| labels[r].clone()).collect());
    out
}

pub(crate) fn select_series(s: &Series, rows: &[usize]) -> Series {
    let labels = s.index_labels();
    Series {
        name: s.name.clone(),
        index: Some(rows.iter().map(|&r| labels[r].clone()).collect()),
        values: rows.iter().map(|&r| s.values[r].clone()).collect(),
    }
}

fn mask_rows(mask: &Series, len: usize) -> Result<Vec<usize>, ExecError> {
    if mask.len() != len {
        return Err(ExecError::index_error(format!(
            "boolean index has wrong length: {} instead of {len}",
            mask.len()
        )));
    }
    Ok(mask
        .values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_truthy())
        .map(|(i, _)| i)
        .collect())
}

fn is_mask(s: &Series) -> bool {
    !s.values.is_empty() && s.values.iter().all(|v| matches!(v, Value::Bool(_)))
}

pub(crate) fn frame_column(df: &DataFrame, name: &str) -> Result<Series, ExecError> {
    let values = df
        .column(name)
        .ok_or_else(|| ExecError::key_error(format!("'{name}'")))?;
    Ok(Series {
        name: Some(name.to_string()),
        index: df.index.clone(),
        values: values.to_vec(),
    })
}

pub(crate) fn get_item(container: &Value, index: &Value) -> Result<Value, ExecError> {
    match container {
        Value::List(items) => {
            let i = int_index(index, "list")?;
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| ExecError::index_error("list index out of range"))
        }
        Value::Tuple(items) => {
            let i = int_index(index, "tuple")?;
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| ExecError::index_error("tuple index out of range"))
        }
        Value::Str(s) => {
            let i = int_index(index, "string")?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::str(chars[i].to_string()))
                .ok_or_else(|| ExecError::index_error("string index out of range"))
        }
        Value::Dict(d) => d
            .get(index)
            .cloned()
            .ok_or_else(|| ExecError::key_error(index.repr())),
        Value::Frame(df) => match index {
            Value::Str(name) => Ok(Value::Series(Rc::new(frame_column(df, name)?))),
            Value::List(names) => {
                let mut columns = Vec::with_capacity(names.len());
                let mut data = Vec::with_capacity(names.len());
                for n in names.iter() {
                    let name = n.as_str().ok_or_else(|| {
                        ExecError::key_error(format!("{} not in columns", n.repr()))
                    })?;
                    let col = df
                        .column(name)
                        .ok_or_else(|| ExecError::key_error(format!("'{name}'")))?;
                    columns.push(name.to_string());
                    data.push(col.to_vec());
                }
                let mut out = DataFrame::new(columns, data)?;
                out.index = df.index.clone();
                out.show_index = df.show_index;
                out.show_header = df.show_header;
                Ok(Value::Frame(Rc::new(out)))
            }
            Value::Series(mask) if is_mask(mask) => {
                let rows = mask_rows(mask, df.n_rows())?;
                Ok(Value::Frame(Rc::new(select_rows(df, &rows))))
            }
            other => Err(ExecError::key_error(other.repr())),
        },
        Value::Series(s) => match index {
            Value::Series(mask) if is_mask(mask) => {
                let rows = mask_rows(mask, s.len())?;
                Ok(Value::Series(Rc::new(select_series(s, &rows))))
            }
            key => match &s.index {
                Some(labels) => labels
                    .iter()
                    .position(|l| l.py_eq(key))
                    .map(|i| s.values[i].clone())
                    .ok_or_else(|| ExecError::key_error(key.repr())),
                None => {
                    let i = int_index(key, "series")?;
                    normalize_index(i, s.len())
                        .map(|i| s.values[i].clone())
                        .ok_or_else(|| ExecError::key_error(key.repr()))
                }
            },
        },
        other => Err(ExecError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Mutable slot for `container[index]` when the item lives inline.
pub(crate) fn item_slot<'v>(
    container: &'v mut Value,
    index: &Value,
) -> Result<Option<&'v mut Value>, ExecError> {
    match container {
        Value::List(items) => {
            let i = int_index(index, "list")?;
            let i = normalize_index(i, items.len())
                .ok_or_else(|| ExecError::index_error("list index out of range"))?;
            Ok(Some(&mut Rc::make_mut(items)[i]))
        }
        Value::Dict(d) => {
            if !d.contains_key(index) {
                return Err(ExecError::key_error(index.repr()));
            }
            Ok(Rc::make_mut(d).get_mut(index))
        }
        _ => Ok(None),
    }
}

pub(crate) fn set_item(container: &mut Value, index: Value, value: Value) -> Result<(), ExecError> {
    match container {
        Value::List(items) => {
            let i = int_index(&index, "list")?;
            let i = normalize_index(i, items.len())
                .ok_or_else(|| ExecError::index_error("list assignment index out of range"))?;
            Rc::make_mut(items)[i] = value;
            Ok(())
        }
        Value::Dict(d) => {
            if !index.is_hashable() {
                return Err(ExecError::type_error(format!(
                    "unhashable type: '{}'",
                    index.type_name()
                )));
            }
            Rc::make_mut(d).insert(index, value);
            Ok(())
        }
        Value::Frame(df) => {
            let name = index
                .as_str()
                .ok_or_else(|| ExecError::type_error("column labels must be strings"))?
                .to_string();
            set_column(Rc::make_mut(df), name, value)
        }
        other => Err(ExecError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn set_column(df: &mut DataFrame, name: String, value: Value) -> Result<(), ExecError> {
    let rows = df.n_rows();
    let values = match value {
        Value::Series(s) => s.values.clone(),
        Value::List(items) | Value::Tuple(items) => items.as_ref().clone(),
        scalar if scalar.is_scalar() || scalar.is_none() => {
            vec![scalar; rows]
        }
        other => {
            return Err(ExecError::type_error(format!(
                "cannot assign '{}' as a column",
                other.type_name()
            )));
        }
    };
    if df.n_cols() > 0 && values.len() != rows {
        return Err(ExecError::value_error(format!(
            "Length of values ({}) does not match length of index ({rows})",
            values.len()
        )));
    }
    match df.columns.iter().position(|c| *c == name) {
        Some(i) => df.data[i] = values,
        None => {
            df.columns.push(name);
            df.data.push(values);
        }
    }
    Ok(())
}

pub(crate) fn del_item(container: &mut Value, index: &Value) -> Result<(), ExecError> {
    match container {
        Value::List(items) => {
            let i = int_index(index, "list")?;
            let i = normalize_index(i, items.len())
                .ok_or_else(|| ExecError::index_error("list assignment index out of range"))?;
            Rc::make_mut(items).remove(i);
            Ok(())
        }
        Value::Dict(d) => Rc::make_mut(d)
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| ExecError::key_error(index.repr())),
        Value::Frame(df) => {
            let name = index.as_str().unwrap_or_default();
            let df = Rc::make_mut(df);
            let i = df
                .columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| ExecError::key_error(index.repr()))?;
            df.columns.remove(i);
            df.data.remove(i);
            Ok(())
        }
        other => Err(ExecError::type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        ))),
    }
}
