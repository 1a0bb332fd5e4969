//! Arithmetic, comparison and membership operators.

use std::cmp::Ordering;
use std::rc::Rc;

use pycell_common::{ExecError, Series, Value};

use super::items;
use pycell_parse::ast::{CmpOp, Operator, UnaryOp};

pub(crate) fn operator_symbol(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

fn unsupported(op: &str, a: &Value, b: &Value) -> ExecError {
    ExecError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

pub(crate) fn binary_op(op: Operator, left: &Value, right: &Value) -> Result<Value, ExecError> {
    match (left, right) {
        (Value::Series(s), other) if !matches!(other, Value::Series(_)) => {
            series_map(s, |v| binary_op(op, v, other))
        }
        (other, Value::Series(s)) if !matches!(other, Value::Series(_)) => {
            series_map(s, |v| binary_op(op, other, v))
        }
        (Value::Series(a), Value::Series(b)) => series_zip(a, b, |x, y| binary_op(op, x, y)),
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_))
            if !matches!(
                (left, right, op),
                (Value::Bool(_), Value::Bool(_), Operator::BitAnd | Operator::BitOr | Operator::BitXor)
            ) =>
        {
            let (a, b) = (left.as_i64().unwrap_or_default(), right.as_i64().unwrap_or_default());
            int_op(op, a, b)
        }
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
            Operator::BitAnd => *a & *b,
            Operator::BitOr => *a | *b,
            _ => *a ^ *b,
        })),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            float_op(op, x, y).map_err(|e| match e {
                None => unsupported(operator_symbol(op), a, b),
                Some(e) => e,
            })
        }
        _ => sequence_op(op, left, right),
    }
}

fn int_op(op: Operator, a: i64, b: i64) -> Result<Value, ExecError> {
    let checked = |r: Option<i64>| r.map(Value::Int).ok_or_else(ExecError::overflow);
    match op {
        Operator::Add => checked(a.checked_add(b)),
        Operator::Sub => checked(a.checked_sub(b)),
        Operator::Mult => checked(a.checked_mul(b)),
        Operator::Div => {
            if b == 0 {
                return Err(ExecError::zero_division());
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        Operator::FloorDiv => {
            if b == 0 {
                return Err(ExecError::runtime(
                    "ZeroDivisionError",
                    "integer division or modulo by zero",
                ));
            }
            let q = a.checked_div(b).ok_or_else(ExecError::overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { q - 1 } else { q }))
        }
        Operator::Mod => {
            if b == 0 {
                return Err(ExecError::runtime(
                    "ZeroDivisionError",
                    "integer division or modulo by zero",
                ));
            }
            let r = a.checked_rem(b).ok_or_else(ExecError::overflow)?;
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        Operator::Pow => {
            if b >= 0 {
                let exp = u32::try_from(b).map_err(|_| ExecError::overflow())?;
                checked(a.checked_pow(exp))
            } else if a == 0 {
                Err(ExecError::runtime(
                    "ZeroDivisionError",
                    "0.0 cannot be raised to a negative power",
                ))
            } else {
                Ok(Value::Float((a as f64).powf(b as f64)))
            }
        }
        Operator::LShift => {
            if b < 0 {
                return Err(ExecError::value_error("negative shift count"));
            }
            if b >= 63 && a != 0 {
                return Err(ExecError::overflow());
            }
            let shifted = a.checked_shl(b as u32).unwrap_or(0);
            if shifted >> b != a {
                return Err(ExecError::overflow());
            }
            Ok(Value::Int(shifted))
        }
        Operator::RShift => {
            if b < 0 {
                return Err(ExecError::value_error("negative shift count"));
            }
            Ok(Value::Int(if b >= 64 {
                if a < 0 { -1 } else { 0 }
            } else {
                a >> b
            }))
        }
        Operator::BitAnd => Ok(Value::Int(a & b)),
        Operator::BitOr => Ok(Value::Int(a | b)),
        Operator::BitXor => Ok(Value::Int(a ^ b)),
        Operator::MatMult => Err(ExecError::type_error(
            "unsupported operand type(s) for @: 'int' and 'int'",
        )),
    }
}

/// `Err(None)` means the operator does not apply to floats.
fn float_op(op: Operator, a: f64, b: f64) -> Result<Value, Option<ExecError>> {
    let zero = || {
        Some(ExecError::runtime(
            "ZeroDivisionError",
            "float division by zero",
        ))
    };
    let v = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div => {
            if b == 0.0 {
                return Err(zero());
            }
            a / b
        }
        Operator::FloorDiv => {
            if b == 0.0 {
                return Err(zero());
            }
            (a / b).floor()
        }
        Operator::Mod => {
            if b == 0.0 {
                return Err(Some(ExecError::runtime(
                    "ZeroDivisionError",
                    "float modulo",
                )));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        Operator::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(Some(ExecError::runtime(
                    "ZeroDivisionError",
                    "0.0 cannot be raised to a negative power",
                )));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(Some(ExecError::not_supported("complex results")));
            }
            a.powf(b)
        }
        _ => return Err(None),
    };
    if v.is_infinite() && a.is_finite() && b.is_finite() {
        return Err(Some(ExecError::runtime(
            "OverflowError",
            "numerical result out of range",
        )));
    }
    Ok(Value::Float(v))
}

/// Largest string (in bytes) or sequence (in items) a fragment may build.
pub(crate) const MAX_SEQUENCE_LEN: usize = 1 << 26;

/// Length of `unit` repeated `n` times, refused before anything is
/// allocated when it cannot fit.
pub(crate) fn repeated_len(unit: usize, n: i64) -> Result<usize, ExecError> {
    let n = usize::try_from(n.max(0)).map_err(|_| ExecError::overflow())?;
    let total = unit
        .checked_mul(n)
        .ok_or_else(|| ExecError::runtime("OverflowError", "repeated sequence is too long"))?;
    if total > MAX_SEQUENCE_LEN {
        return Err(ExecError::runtime(
            "MemoryError",
            format!("cannot build a sequence of {total} items"),
        ));
    }
    Ok(total)
}

fn repeat(items: &[Value], n: i64) -> Result<Vec<Value>, ExecError> {
    let mut out = Vec::with_capacity(repeated_len(items.len(), n)?);
    for _ in 0..n.max(0) {
        if items.is_empty() {
            break;
        }
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn sequence_op(op: Operator, left: &Value, right: &Value) -> Result<Value, ExecError> {
    match (op, left, right) {
        (Operator::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (Operator::Add, Value::List(a), Value::List(b)) => {
            let mut out = a.as_ref().clone();
            out.extend(b.iter().cloned());
            Ok(Value::list(out))
        }
        (Operator::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut out = a.as_ref().clone();
            out.extend(b.iter().cloned());
            Ok(Value::tuple(out))
        }
        (Operator::BitOr, Value::Set(a), Value::Set(b)) => Ok(Value::set(a.union(b))),
        (Operator::BitAnd, Value::Set(a), Value::Set(b)) => Ok(Value::set(a.intersection(b))),
        (Operator::Sub, Value::Set(a), Value::Set(b)) => Ok(Value::set(a.difference(b))),
        (Operator::BitXor, Value::Set(a), Value::Set(b)) => {
            Ok(Value::set(a.symmetric_difference(b)))
        }
        (Operator::Mult, Value::Str(s), n) | (Operator::Mult, n, Value::Str(s))
            if n.as_i64().is_some() =>
        {
            let n = n.as_i64().unwrap_or(0);
            repeated_len(s.len(), n)?;
            Ok(Value::str(s.repeat(n.max(0) as usize)))
        }
        (Operator::Mult, Value::List(items), n) | (Operator::Mult, n, Value::List(items))
            if n.as_i64().is_some() =>
        {
            Ok(Value::list(repeat(items, n.as_i64().unwrap_or(0))?))
        }
        (Operator::Mult, Value::Tuple(items), n) | (Operator::Mult, n, Value::Tuple(items))
            if n.as_i64().is_some() =>
        {
            Ok(Value::tuple(repeat(items, n.as_i64().unwrap_or(0))?))
        }
        _ => Err(unsupported(operator_symbol(op), left, right)),
    }
}

fn series_map(
    s: &Series,
    mut f: impl FnMut(&Value) -> Result<Value, ExecError>,
) -> Result<Value, ExecError> {
    let values = s.values.iter().map(&mut f).collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Series(Rc::new(Series {
        name: s.name.clone(),
        index: s.index.clone(),
        values,
    })))
}

fn series_zip(
    a: &Series,
    b: &Series,
    mut f: impl FnMut(&Value, &Value) -> Result<Value, ExecError>,
) -> Result<Value, ExecError> {
    if a.len() != b.len() {
        return Err(ExecError::value_error(
            "Can only compare identically-labeled Series objects",
        ));
    }
    let values = a
        .values
        .iter()
        .zip(&b.values)
        .map(|(x, y)| f(x, y))
        .collect::<Result<Vec<_>, _>>()?;
    let name = if a.name == b.name { a.name.clone() } else { None };
    Ok(Value::Series(Rc::new(Series {
        name,
        index: a.index.clone(),
        values,
    })))
}

pub(crate) fn unary_op(op: UnaryOp, v: &Value) -> Result<Value, ExecError> {
    if let (Value::Series(s), UnaryOp::USub | UnaryOp::Not | UnaryOp::Invert) = (v, op) {
        return series_map(s, |x| match op {
            UnaryOp::Not | UnaryOp::Invert if matches!(x, Value::Bool(_)) => {
                Ok(Value::Bool(!x.is_truthy()))
            }
            _ => unary_op(op, x),
        });
    }
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::USub, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(ExecError::overflow),
        (UnaryOp::USub, Value::Bool(b)) => Ok(Value::Int(-(*b as i64))),
        (UnaryOp::USub, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::UAdd, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (UnaryOp::UAdd, v @ (Value::Int(_) | Value::Float(_))) => Ok(v.clone()),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Int(!(*b as i64))),
        (op, v) => {
            let sym = match op {
                UnaryOp::USub => "-",
                UnaryOp::UAdd => "+",
                UnaryOp::Invert => "~",
                UnaryOp::Not => "not",
            };
            Err(ExecError::type_error(format!(
                "bad operand type for unary {sym}: '{}'",
                v.type_name()
            )))
        }
    }
}

/// Total order used by `<`, `sorted`, `min` and `max`. `None` for NaN.
pub(crate) fn order(a: &Value, b: &Value, sym: &str) -> Result<Option<Ordering>, ExecError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        (x, y) if x.is_numeric() && y.is_numeric() => {
            let (p, q) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            Ok(p.partial_cmp(&q))
        }
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::Date(x), Value::Date(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            for (p, q) in x.iter().zip(y.iter()) {
                if !p.py_eq(q) {
                    return order(p, q, sym);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => Err(ExecError::type_error(format!(
            "'{sym}' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub(crate) fn contains(container: &Value, item: &Value) -> Result<bool, ExecError> {
    match container {
        Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            other => Err(ExecError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Dict(d) => Ok(d.contains_key(item)),
        Value::Set(set) => {
            items::hashable(item)?;
            Ok(set.contains(item))
        }
        Value::Series(s) => Ok(s.index_labels().iter().any(|l| l.py_eq(item))),
        Value::Frame(df) => Ok(item.as_str().is_some_and(|n| df.columns.iter().any(|c| c == n))),
        other => Err(ExecError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Frame(x), Value::Frame(y)) => Rc::ptr_eq(x, y),
        (Value::Series(x), Value::Series(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        (Value::Callable(x), Value::Callable(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

fn compare_scalar(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ExecError> {
    if let (Value::Set(x), Value::Set(y)) = (a, b) {
        match op {
            CmpOp::Lt => return Ok(x.len() < y.len() && x.is_subset(y)),
            CmpOp::LtE => return Ok(x.is_subset(y)),
            CmpOp::Gt => return Ok(y.len() < x.len() && y.is_subset(x)),
            CmpOp::GtE => return Ok(y.is_subset(x)),
            _ => {}
        }
    }
    let ordered = |sym: &str, want: fn(Ordering) -> bool| -> Result<bool, ExecError> {
        Ok(order(a, b, sym)?.is_some_and(want))
    };
    match op {
        CmpOp::Eq => Ok(a.py_eq(b)),
        CmpOp::NotEq => Ok(!a.py_eq(b)),
        CmpOp::Lt => ordered("<", Ordering::is_lt),
        CmpOp::LtE => ordered("<=", Ordering::is_le),
        CmpOp::Gt => ordered(">", Ordering::is_gt),
        CmpOp::GtE => ordered(">=", Ordering::is_ge),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|r| !r),
        CmpOp::Is => Ok(identical(a, b)),
        CmpOp::IsNot => Ok(!identical(a, b)),
    }
}

/// One comparison link. Series compare element-wise and yield a mask.
pub(crate) fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<Value, ExecError> {
    let elementwise = !matches!(op, CmpOp::In | CmpOp::NotIn | CmpOp::Is | CmpOp::IsNot);
    match (a, b) {
        (Value::Series(x), Value::Series(y)) if elementwise => {
            series_zip(x, y, |p, q| compare_scalar(op, p, q).map(Value::Bool))
        }
        (Value::Series(x), other) if elementwise => {
            series_map(x, |p| compare_scalar(op, p, other).map(Value::Bool))
        }
        (other, Value::Series(y)) if elementwise => {
            series_map(y, |q| compare_scalar(op, other, q).map(Value::Bool))
        }
        _ => compare_scalar(op, a, b).map(Value::Bool),
    }
}
