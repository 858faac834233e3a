//! Hierarchical configuration document.
//!
//! A tree of key → scalar | subtree backed by a JSON object. Keys may be
//! dotted (`enfranchise.age`) to address nested subtrees. Scalar reads are
//! lenient the way an operator-edited document needs them to be: a number
//! stored as the string `"30"` reads back as `30`, and `1`/`"1"`/`true` are
//! all truthy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Errors from typed reads.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    Missing(String),

    #[error("Configuration key {key} has the wrong type (expected {expected})")]
    WrongType { key: String, expected: &'static str },
}

/// Configuration document (tree of key → value).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDoc(Map<String, Value>);

impl ConfigDoc {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value. Non-object values produce an empty document.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate the top-level entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Look up a (possibly dotted) key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut cur = self.0.get(first)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    /// True if the key exists (scalar or subtree).
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// True if the key exists and is a subtree.
    pub fn has_child(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Object(_)))
    }

    /// Copy of the subtree at `key`, if there is one.
    pub fn get_child(&self, key: &str) -> Option<ConfigDoc> {
        match self.get(key) {
            Some(Value::Object(map)) => Some(ConfigDoc(map.clone())),
            _ => None,
        }
    }

    /// Set a value, creating intermediate subtrees. An intermediate scalar on
    /// the path is replaced by a subtree.
    pub fn put(&mut self, key: &str, value: impl Into<Value>) {
        let parts: Vec<&str> = key.split('.').collect();
        let Some((last, path)) = parts.split_last() else {
            return;
        };

        let mut cur = &mut self.0;
        for part in path {
            let slot = cur
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cur = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        cur.insert(last.to_string(), value.into());
    }

    pub fn put_child(&mut self, key: &str, child: ConfigDoc) {
        self.put(key, child.into_value());
    }

    /// Remove a key. Returns whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let parts: Vec<&str> = key.split('.').collect();
        let Some((last, path)) = parts.split_last() else {
            return false;
        };

        let mut cur = &mut self.0;
        for part in path {
            cur = match cur.get_mut(*part) {
                Some(Value::Object(map)) => map,
                _ => return false,
            };
        }
        cur.remove(*last).is_some()
    }

    pub(crate) fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Read a scalar as a string. Missing keys and subtrees read as `""`.
    pub fn get_str(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, ConfigError> {
        let wrong = || ConfigError::WrongType {
            key: key.to_string(),
            expected: "unsigned integer",
        };
        match self.get(key) {
            None => Err(ConfigError::Missing(key.to_string())),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(wrong),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| wrong()),
            Some(Value::Bool(b)) => Ok(u64::from(*b)),
            Some(_) => Err(wrong()),
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigError> {
        let wrong = || ConfigError::WrongType {
            key: key.to_string(),
            expected: "number",
        };
        match self.get(key) {
            None => Err(ConfigError::Missing(key.to_string())),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(wrong),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| wrong()),
            Some(_) => Err(wrong()),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Err(ConfigError::Missing(key.to_string())),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Some(Value::String(s)) => match s.trim() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "" | "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::WrongType {
                    key: key.to_string(),
                    expected: "boolean",
                }),
            },
            Some(_) => Err(ConfigError::WrongType {
                key: key.to_string(),
                expected: "boolean",
            }),
        }
    }

    pub fn get_u64_or(&self, key: &str, default: u64) -> u64 {
        self.get_u64(key).unwrap_or(default)
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

impl From<Map<String, Value>> for ConfigDoc {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for ConfigDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_put_and_get() {
        let mut doc = ConfigDoc::new();
        doc.put("enfranchise.age", 1800);
        doc.put("enfranchise.access", "ov");

        assert_eq!(doc.get_u64("enfranchise.age").unwrap(), 1800);
        assert_eq!(doc.get_str("enfranchise.access"), "ov");
        assert!(doc.has_child("enfranchise"));
        assert!(!doc.has_child("enfranchise.age"));
    }

    #[test]
    fn test_lenient_scalar_reads() {
        let doc = ConfigDoc::from_value(json!({
            "duration": "45",
            "plurality": "0.66",
            "flag": 1,
            "off": "0",
        }));

        assert_eq!(doc.get_u64("duration").unwrap(), 45);
        assert!((doc.get_f64("plurality").unwrap() - 0.66).abs() < f64::EPSILON);
        assert!(doc.get_bool("flag").unwrap());
        assert!(!doc.get_bool("off").unwrap());
        assert_eq!(doc.get_str("flag"), "1");
    }

    #[test]
    fn test_missing_and_wrong_type() {
        let doc = ConfigDoc::from_value(json!({ "name": "abc" }));

        assert_eq!(
            doc.get_u64("nope"),
            Err(ConfigError::Missing("nope".to_string()))
        );
        assert!(matches!(
            doc.get_u64("name"),
            Err(ConfigError::WrongType { .. })
        ));
        assert_eq!(doc.get_u64_or("nope", 7), 7);
        assert_eq!(doc.get_str("nope"), "");
    }

    #[test]
    fn test_put_replaces_intermediate_scalar() {
        let mut doc = ConfigDoc::from_value(json!({ "vote": 3 }));
        doc.put("vote.duration", 60);
        assert_eq!(doc.get_u64("vote.duration").unwrap(), 60);
    }

    #[test]
    fn test_remove() {
        let mut doc = ConfigDoc::from_value(json!({ "a": { "b": 1, "c": 2 } }));
        assert!(doc.remove("a.b"));
        assert!(!doc.remove("a.b"));
        assert!(!doc.remove("x.y"));
        assert!(doc.has("a.c"));
    }

    #[test]
    fn test_get_child_is_a_copy() {
        let mut doc = ConfigDoc::from_value(json!({ "config": { "vote": { "duration": 30 } } }));
        let mut child = doc.get_child("config.vote").unwrap();
        child.put("duration", 90);
        assert_eq!(doc.get_u64("config.vote.duration").unwrap(), 30);

        doc.put_child("config.vote", child);
        assert_eq!(doc.get_u64("config.vote.duration").unwrap(), 90);
    }
}
