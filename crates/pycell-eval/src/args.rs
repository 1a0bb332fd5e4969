use pycell_common::{ExecError, Value};
use smallvec::SmallVec;

/// Evaluated arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: SmallVec<[Value; 4]>,
    pub keywords: SmallVec<[(String, Value); 2]>,
}

impl CallArgs {
    pub fn new(positional: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: positional.into_iter().collect(),
            keywords: SmallVec::new(),
        }
    }

    pub fn with_keyword(mut self, name: &str, value: Value) -> Self {
        self.keywords.push((name.to_string(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Positional argument `i`, falling back to keyword `name`.
    pub fn get(&self, i: usize, name: &str) -> Option<&Value> {
        self.positional.get(i).or_else(|| self.keyword(name))
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn require(&self, func: &str, i: usize, name: &str) -> Result<&Value, ExecError> {
        self.get(i, name).ok_or_else(|| {
            ExecError::type_error(format!(
                "{func}() missing required argument: '{name}' (pos {})",
                i + 1
            ))
        })
    }

    /// Reject calls with more than `max` positional arguments.
    pub fn at_most(&self, func: &str, max: usize) -> Result<(), ExecError> {
        if self.positional.len() > max {
            return Err(ExecError::type_error(format!(
                "{func}() takes at most {max} arguments ({} given)",
                self.positional.len()
            )));
        }
        Ok(())
    }

    pub fn exactly(&self, func: &str, n: usize) -> Result<(), ExecError> {
        if self.positional.len() != n {
            return Err(ExecError::type_error(format!(
                "{func}() takes exactly {n} argument{} ({} given)",
                if n == 1 { "" } else { "s" },
                self.positional.len()
            )));
        }
        Ok(())
    }

    pub fn flag(&self, i: usize, name: &str, default: bool) -> bool {
        self.get(i, name).map(Value::is_truthy).unwrap_or(default)
    }

    pub fn int(&self, func: &str, i: usize, name: &str, default: i64) -> Result<i64, ExecError> {
        match self.get(i, name) {
            None | Some(Value::None) => Ok(default),
            Some(v) => v.as_i64().ok_or_else(|| {
                ExecError::type_error(format!(
                    "{func}() argument '{name}' must be int, not {}",
                    v.type_name()
                ))
            }),
        }
    }

    pub fn string(&self, i: usize, name: &str) -> Option<String> {
        self.get(i, name).and_then(|v| v.as_str()).map(str::to_string)
    }
}

/// Numeric view of a value, or a `TypeError` naming the caller.
pub fn number(func: &str, v: &Value) -> Result<f64, ExecError> {
    v.as_f64().ok_or_else(|| {
        ExecError::type_error(format!(
            "{func}() argument must be a number, not '{}'",
            v.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_then_keyword_lookup() {
        let args = CallArgs::new([Value::Int(3)]).with_keyword("n", Value::Int(9));
        assert_eq!(args.get(0, "x"), Some(&Value::Int(3)));
        assert_eq!(args.get(1, "n"), Some(&Value::Int(9)));
        assert!(args.get(2, "m").is_none());
        assert_eq!(args.int("head", 1, "n", 5).unwrap(), 9);
        assert_eq!(args.int("head", 2, "k", 5).unwrap(), 5);
    }

    #[test]
    fn arity_errors_are_type_errors() {
        let args = CallArgs::new([Value::Int(1), Value::Int(2)]);
        let err = args.at_most("abs", 1).unwrap_err();
        assert_eq!(err.exception_name(), "TypeError");
        assert!(args.exactly("divmod", 2).is_ok());
    }
}
