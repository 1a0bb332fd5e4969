//! Format-spec mini-language used by f-strings and `str.format`.

use pycell_common::{ExecError, Value, format_float};

use crate::args::CallArgs;
use crate::interpreter::ops::MAX_SEQUENCE_LEN;

#[derive(Debug, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<Spec, ExecError> {
    let invalid = || ExecError::value_error(format!("Invalid format specifier '{spec}'"));
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|c| is_align(*c)) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'0') {
        out.fill.get_or_insert('0');
        out.align.get_or_insert('=');
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i].iter().collect::<String>().parse().map_err(|_| invalid())?;
        if out.width > MAX_SEQUENCE_LEN {
            return Err(ExecError::value_error("Too many decimal digits in format string"));
        }
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            out.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(invalid());
        }
        out.precision = Some(chars[start..i].iter().collect::<String>().parse().map_err(|_| invalid())?);
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid());
    }
    Ok(out)
}

fn group_digits(digits: &str, sep: char) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(dot) => digits.split_at(dot),
        None => (digits, ""),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(sep);
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

/// Python's `%g`: significant digits, trailing zeros removed.
fn general(x: f64, precision: usize) -> String {
    if x == 0.0 || !x.is_finite() {
        return format_float(x).trim_end_matches(".0").to_string();
    }
    let p = precision.max(1);
    let exp = x.abs().log10().floor() as i32;
    let trimmed = |s: String| {
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        }
    };
    if exp < -4 || exp >= p as i32 {
        let mantissa = x / 10f64.powi(exp);
        let m = trimmed(format!("{:.*}", p - 1, mantissa));
        format!("{m}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        trimmed(format!("{x:.decimals$}"))
    }
}

fn scientific(x: f64, precision: usize, upper: bool) -> String {
    let s = format!("{x:.precision$e}");
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let out = format!("{mantissa}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs());
    if upper { out.to_uppercase() } else { out }
}

fn format_number(value: &Value, spec: &Spec) -> Result<String, ExecError> {
    let x = value.as_f64().unwrap_or_default();
    let body = match spec.kind {
        Some('d') => {
            let i = value.as_i64().ok_or_else(|| {
                ExecError::value_error(format!(
                    "Unknown format code 'd' for object of type '{}'",
                    value.type_name()
                ))
            })?;
            i.abs().to_string()
        }
        Some('x') | Some('X') | Some('o') | Some('b') => {
            let i = value.as_i64().ok_or_else(|| {
                ExecError::value_error("integer format code used with a non-integer")
            })?;
            let a = i.unsigned_abs();
            match spec.kind {
                Some('x') => format!("{a:x}"),
                Some('X') => format!("{a:X}"),
                Some('o') => format!("{a:o}"),
                _ => format!("{a:b}"),
            }
        }
        Some('f') | Some('F') => format!("{:.*}", spec.precision.unwrap_or(6), x.abs()),
        Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), x.abs() * 100.0),
        Some('e') | Some('E') => scientific(x.abs(), spec.precision.unwrap_or(6), spec.kind == Some('E')),
        Some('g') | Some('G') => general(x.abs(), spec.precision.unwrap_or(6)),
        None => match (value, spec.precision) {
            (Value::Float(_), Some(p)) => general(x.abs(), p),
            (Value::Float(_), None) => format_float(x.abs()),
            _ => value.as_i64().unwrap_or_default().unsigned_abs().to_string(),
        },
        Some(other) => {
            return Err(ExecError::value_error(format!(
                "Unknown format code '{other}' for object of type '{}'",
                value.type_name()
            )));
        }
    };
    let body = match spec.grouping {
        Some(sep) if !matches!(spec.kind, Some('x' | 'X' | 'o' | 'b' | 'e' | 'E')) => {
            group_digits(&body, sep)
        }
        _ => body,
    };
    let negative = x < 0.0 || value.as_i64().is_some_and(|i| i < 0);
    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    Ok(pad(sign, &body, spec, '>'))
}

fn pad(sign: &str, body: &str, spec: &Spec, default_align: char) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let fill = spec.fill.unwrap_or(' ');
    let gap = spec.width - len;
    let fill_n = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{sign}{body}{}", fill_n(gap)),
        '^' => format!("{}{sign}{body}{}", fill_n(gap / 2), fill_n(gap - gap / 2)),
        '=' => format!("{sign}{}{body}", fill_n(gap)),
        _ => format!("{}{sign}{body}", fill_n(gap)),
    }
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> Result<String, ExecError> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let spec = parse_spec(spec)?;
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) if spec.kind != Some('s') => {
            format_number(value, &spec)
        }
        Value::Date(d) if spec.kind.is_none() && spec.width == 0 => Ok(d.to_string()),
        other => {
            if spec.kind.is_some_and(|k| k != 's') {
                return Err(ExecError::value_error(format!(
                    "Unknown format code '{}' for object of type '{}'",
                    spec.kind.unwrap_or('s'),
                    other.type_name()
                )));
            }
            let mut text = other.to_string();
            if let Some(p) = spec.precision {
                text = text.chars().take(p).collect();
            }
            Ok(pad("", &text, &spec, '<'))
        }
    }
}

/// `template.format(*args, **kwargs)`.
pub fn format_template(template: &str, args: &CallArgs) -> Result<String, ExecError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(ExecError::value_error(
                                "expected '}' before end of string",
                            ));
                        }
                    }
                }
                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = head.split_once('!').unwrap_or((head, ""));
                let found = if name.is_empty() {
                    let v = args.positional.get(auto).cloned();
                    auto += 1;
                    v
                } else if let Ok(i) = name.parse::<usize>() {
                    args.positional.get(i).cloned()
                } else {
                    args.keyword(name).cloned()
                };
                let value = found.ok_or_else(|| {
                    if name.is_empty() || name.parse::<usize>().is_ok() {
                        ExecError::index_error("Replacement index out of range for positional args tuple")
                    } else {
                        ExecError::key_error(format!("'{name}'"))
                    }
                })?;
                let value = match conversion {
                    "r" => Value::str(value.repr()),
                    "s" => Value::str(value.to_string()),
                    _ => value,
                };
                out.push_str(&format_value(&value, spec)?);
            }
            '}' => {
                return Err(ExecError::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
