use std::fmt::Write;
use std::rc::Rc;

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, NaiveDate};
use pycell_common::{ExecError, Module, Value};

use crate::args::CallArgs;
use crate::builtins::Builtin;
use crate::interpreter::Interpreter;

fn ymd(func: &str, year: i64, month: i64, day: i64) -> Result<NaiveDate, ExecError> {
    if !(1..=9999).contains(&year) {
        return Err(ExecError::value_error(format!("year {year} is out of range")));
    }
    if !(1..=12).contains(&month) {
        return Err(ExecError::value_error("month must be in 1..12"));
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).ok_or_else(|| {
        ExecError::value_error(format!("day is out of range for month in {func}()"))
    })
}

fn date(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.at_most("date", 3)?;
    let year = args.int("date", 0, "year", i64::MIN)?;
    let month = args.int("date", 1, "month", i64::MIN)?;
    let day = args.int("date", 2, "day", i64::MIN)?;
    if [year, month, day].contains(&i64::MIN) {
        return Err(ExecError::type_error("date() missing required argument"));
    }
    Ok(Value::Date(ymd("date", year, month, day)?))
}

/// Parse `YYYY-MM-DD`.
pub(crate) fn parse_iso(text: &str) -> Result<NaiveDate, ExecError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| ExecError::value_error(format!("Invalid isoformat string: '{text}'")))
}

fn fromisoformat(_: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    args.exactly("fromisoformat", 1)?;
    match &args.positional[0] {
        Value::Str(s) => Ok(Value::Date(parse_iso(s)?)),
        other => Err(ExecError::type_error(format!(
            "fromisoformat: argument must be str, not {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn module() -> Value {
    Value::Module(Rc::new(
        Module::new("datetime")
            .with("date", Builtin::value("date", date))
            .with("fromisoformat", Builtin::value("fromisoformat", fromisoformat))
            .with("MINYEAR", Value::Int(1))
            .with("MAXYEAR", Value::Int(9999)),
    ))
}

pub(crate) fn date_attr(d: &NaiveDate, attr: &str) -> Option<Value> {
    Some(match attr {
        "year" => Value::Int(d.year() as i64),
        "month" => Value::Int(d.month() as i64),
        "day" => Value::Int(d.day() as i64),
        _ => return None,
    })
}

fn strftime(d: &NaiveDate, fmt: &str) -> Result<String, ExecError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(ExecError::value_error(format!("Invalid format string '{fmt}'")));
    }
    let mut out = String::new();
    write!(out, "{}", d.format_with_items(items.into_iter()))
        .map_err(|_| ExecError::value_error(format!("Invalid format string '{fmt}'")))?;
    Ok(out)
}

pub(crate) fn date_method(d: &NaiveDate, method: &str, args: &CallArgs) -> Result<Option<Value>, ExecError> {
    let v = match method {
        "isoformat" => Value::str(d.format("%Y-%m-%d").to_string()),
        "strftime" => {
            let fmt = args.string(0, "format").ok_or_else(|| {
                ExecError::type_error("strftime() argument 1 must be str")
            })?;
            Value::str(strftime(d, &fmt)?)
        }
        "weekday" => Value::Int(d.weekday().num_days_from_monday() as i64),
        "isoweekday" => Value::Int(d.weekday().number_from_monday() as i64),
        "replace" => {
            let year = args.int("replace", 0, "year", d.year() as i64)?;
            let month = args.int("replace", 1, "month", d.month() as i64)?;
            let day = args.int("replace", 2, "day", d.day() as i64)?;
            Value::Date(ymd("replace", year, month, day)?)
        }
        "toordinal" => Value::Int(d.num_days_from_ce() as i64),
        _ => return Ok(None),
    };
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn strftime_and_weekday() {
        let d = day(2024, 3, 15);
        let fmt = CallArgs::new([Value::str("%d/%m/%Y")]);
        assert_eq!(date_method(&d, "strftime", &fmt).unwrap(), Some(Value::str("15/03/2024")));
        assert_eq!(date_method(&d, "weekday", &CallArgs::default()).unwrap(), Some(Value::Int(4)));
        assert_eq!(date_attr(&d, "month"), Some(Value::Int(3)));
    }

    #[test]
    fn invalid_strftime_does_not_panic() {
        let err = strftime(&day(2024, 1, 1), "%Q").unwrap_err();
        assert_eq!(err.exception_name(), "ValueError");
    }

    #[test]
    fn out_of_range_day() {
        assert!(ymd("date", 2023, 2, 29).is_err());
        assert_eq!(parse_iso("2024-02-29").unwrap(), day(2024, 2, 29));
    }
}
