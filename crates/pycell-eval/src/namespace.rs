use pycell_common::Value;
use rustc_hash::FxHashMap;

/// The shared name -> value environment of one document.
///
/// Cloning is a shallow snapshot: values are reference counted and never
/// mutated in place once shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    vars: FxHashMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.vars.retain(|k, v| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sorted binding names, for stable diagnostics.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Shallow copy used for state snapshots.
    pub fn snapshot(&self) -> Namespace {
        self.clone()
    }
}

impl FromIterator<(String, Value)> for Namespace {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_independent() {
        let mut ns = Namespace::new();
        ns.set("x", Value::Int(1));
        let snap = ns.snapshot();
        ns.set("x", Value::Int(2));
        ns.set("y", Value::Int(3));
        assert_eq!(snap.get("x"), Some(&Value::Int(1)));
        assert!(!snap.contains("y"));
        assert_eq!(ns.names(), vec!["x", "y"]);
    }
}
