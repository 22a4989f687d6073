//! Ordered binding sets injected into compiled scripts.

use rhai::Dynamic;
use serde_json::Value;

use super::convert::json_to_dynamic;

/// Ordered name -> value mapping that becomes a script's formal parameters.
///
/// Inserting an existing name replaces its value and keeps its position, so
/// the parameter order is the order in which names were first inserted.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Dynamic)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a JSON value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.insert_dynamic(name, json_to_dynamic(value));
    }

    /// Bind a native Rhai value (e.g. a function pointer).
    pub fn insert_dynamic(&mut self, name: impl Into<String>, value: Dynamic) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Merge `other` into this set; its values win on name clashes.
    pub fn extend(&mut self, other: Bindings) {
        for (name, value) in other.entries {
            self.insert_dynamic(name, value);
        }
    }

    /// Binding names in parameter order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split into parameter names and argument values.
    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Dynamic>) {
        self.entries.into_iter().unzip()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

impl From<serde_json::Map<String, Value>> for Bindings {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}
