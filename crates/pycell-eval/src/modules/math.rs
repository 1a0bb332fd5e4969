use std::f64::consts;
use std::rc::Rc;

use pycell_common::{ExecError, Module, Value};

use crate::args::{CallArgs, number};
use crate::builtins::Builtin;
use crate::interpreter::Interpreter;

fn domain_error() -> ExecError {
    ExecError::value_error("math domain error")
}

/// Results that turn a finite input into NaN or infinity are domain errors.
fn checked(input: f64, out: f64) -> Result<Value, ExecError> {
    if (out.is_nan() && !input.is_nan()) || (out.is_infinite() && input.is_finite()) {
        return Err(domain_error());
    }
    Ok(Value::Float(out))
}

macro_rules! float_fn {
    ($($name:ident => $f:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
                args.exactly(stringify!($name), 1)?;
                let x = number(stringify!($name), &args.positional[0])?;
                let f: fn(f64) -> f64 = $f;
                checked(x, f(x))
            }
        )*
    };
}

float_fn! {
    sqrt => f64::sqrt,
    exp => f64::exp,
    log10 => f64::log10,
    log2 => f64::log2,
    sin => f64::sin,
    cos => f64::cos,
    tan => f64::tan,
    asin => f64::asin,
    acos => f64::acos,
    atan => f64::atan,
    fabs => f64::abs,
    degrees => f64::to_degrees,
    radians => f64::to_radians,
}

fn log(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("log", 2)?;
    let x = number("log", args.require("log", 0, "x")?)?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1, "base") {
        None => Ok(Value::Float(x.ln())),
        Some(b) => {
            let base = number("log", b)?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
    }
}

fn to_int(func: &str, x: f64) -> Result<Value, ExecError> {
    if x.is_nan() {
        return Err(ExecError::value_error("cannot convert float NaN to integer"));
    }
    if !x.is_finite() || x.abs() > i64::MAX as f64 {
        return Err(ExecError::runtime(
            "OverflowError",
            format!("cannot convert float infinity to integer in {func}()"),
        ));
    }
    Ok(Value::Int(x as i64))
}

fn floor(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("floor", 1)?;
    match &args.positional[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        v => to_int("floor", number("floor", v)?.floor()),
    }
}

fn ceil(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("ceil", 1)?;
    match &args.positional[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        v => to_int("ceil", number("ceil", v)?.ceil()),
    }
}

fn trunc(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("trunc", 1)?;
    match &args.positional[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        v => to_int("trunc", number("trunc", v)?.trunc()),
    }
}

fn pow(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("pow", 2)?;
    let x = number("pow", &args.positional[0])?;
    let y = number("pow", &args.positional[1])?;
    if x == 0.0 && y < 0.0 {
        return Err(domain_error());
    }
    checked(x, x.powf(y))
}

fn atan2(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("atan2", 2)?;
    let y = number("atan2", &args.positional[0])?;
    let x = number("atan2", &args.positional[1])?;
    Ok(Value::Float(y.atan2(x)))
}

fn hypot(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let mut acc = 0.0f64;
    for v in &args.positional {
        let x = number("hypot", v)?;
        acc = acc.hypot(x);
    }
    Ok(Value::Float(acc))
}

fn isnan(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("isnan", 1)?;
    Ok(Value::Bool(number("isnan", &args.positional[0])?.is_nan()))
}

fn isinf(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("isinf", 1)?;
    Ok(Value::Bool(number("isinf", &args.positional[0])?.is_infinite()))
}

fn isclose(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let a = number("isclose", args.require("isclose", 0, "a")?)?;
    let b = number("isclose", args.require("isclose", 1, "b")?)?;
    let rel = args.keyword("rel_tol").map(|v| number("isclose", v)).transpose()?.unwrap_or(1e-9);
    let abs = args.keyword("abs_tol").map(|v| number("isclose", v)).transpose()?.unwrap_or(0.0);
    if a == b {
        return Ok(Value::Bool(true));
    }
    let diff = (a - b).abs();
    Ok(Value::Bool(diff <= (rel * b.abs()).max(rel * a.abs()) || diff <= abs))
}

fn factorial(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("factorial", 1)?;
    let n = match &args.positional[0] {
        Value::Int(n) => *n,
        Value::Bool(b) => *b as i64,
        other => {
            return Err(ExecError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            )));
        }
    };
    if n < 0 {
        return Err(ExecError::value_error("factorial() not defined for negative values"));
    }
    (1..=n)
        .try_fold(1i64, |acc, k| acc.checked_mul(k))
        .map(Value::Int)
        .ok_or_else(ExecError::overflow)
}

fn gcd(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let mut acc = 0i64;
    for v in &args.positional {
        let mut b = v
            .as_i64()
            .filter(|_| !matches!(v, Value::Float(_)))
            .ok_or_else(|| {
                ExecError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })?
            .abs();
        let mut a = acc;
        while b != 0 {
            (a, b) = (b, a % b);
        }
        acc = a;
    }
    Ok(Value::Int(acc))
}

pub(crate) fn module() -> Value {
    let mut m = Module::new("math")
        .with("pi", Value::Float(consts::PI))
        .with("e", Value::Float(consts::E))
        .with("tau", Value::Float(consts::TAU))
        .with("inf", Value::Float(f64::INFINITY))
        .with("nan", Value::Float(f64::NAN));
    let functions: &[(&'static str, crate::builtins::BuiltinFn)] = &[
        ("sqrt", sqrt),
        ("exp", exp),
        ("log", log),
        ("log10", log10),
        ("log2", log2),
        ("sin", sin),
        ("cos", cos),
        ("tan", tan),
        ("asin", asin),
        ("acos", acos),
        ("atan", atan),
        ("atan2", atan2),
        ("fabs", fabs),
        ("degrees", degrees),
        ("radians", radians),
        ("floor", floor),
        ("ceil", ceil),
        ("trunc", trunc),
        ("pow", pow),
        ("hypot", hypot),
        ("isnan", isnan),
        ("isinf", isinf),
        ("isclose", isclose),
        ("factorial", factorial),
        ("gcd", gcd),
    ];
    for &(name, func) in functions {
        m = m.with(name, Builtin::value(name, func));
    }
    Value::Module(Rc::new(m))
}
