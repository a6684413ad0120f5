//! Request argument access.
//!
//! Clients send loosely typed values: form-encoded transports turn booleans
//! into `"1"`, numbers into strings and arrays into `key[]` keys. [`Args`]
//! smooths that over so handlers can ask for the type they want.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use crate::commands::Command;
use crate::volume::UploadFile;

/// Arguments of one request, with schema defaults filled in.
#[derive(Debug, Clone, Default)]
pub struct Args {
    map: Map<String, Value>,
}

impl Args {
    /// Wrap raw arguments, inserting defaults for absent optional keys.
    pub fn new(command: Command, mut map: Map<String, Value>) -> Self {
        for spec in command.schema() {
            if let Some(default) = spec.default {
                if !map.contains_key(spec.name) {
                    map.insert(spec.name.to_string(), Value::String(default.to_string()));
                }
            }
        }
        Self { map }
    }

    /// Raw value under `key` or `key[]`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map
            .get(key)
            .or_else(|| self.map.get(&format!("{key}[]")))
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// A scalar as a string. Numbers are formatted, other types ignored.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A scalar as a string, empty if absent.
    pub fn string_or_empty(&self, key: &str) -> String {
        self.string(key).unwrap_or_default()
    }

    /// A list of strings. A lone string counts as a one-element list.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// A boolean flag: `true`, non-zero numbers, `"1"`, `"true"`, `"yes"`.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "yes" | "on"),
            _ => false,
        }
    }

    /// An integer, from a number or a numeric string.
    pub fn number(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Uploaded files under `FILES`.
    ///
    /// Each file is `{"name": ..., "content": ..., "encoding": "base64"?}`.
    /// Entries that cannot be decoded come back as `Err(name)`.
    pub fn uploads(&self) -> Vec<Result<UploadFile, String>> {
        let items = match self.get("FILES") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(item @ Value::Object(_)) => std::slice::from_ref(item),
            _ => &[],
        };
        items.iter().map(decode_upload).collect()
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.map
    }
}

fn decode_upload(value: &Value) -> Result<UploadFile, String> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let content = value.get("content").and_then(Value::as_str).unwrap_or_default();
    let bytes = match value.get("encoding").and_then(Value::as_str) {
        Some("base64") => STANDARD.decode(content).map_err(|_| name.clone())?,
        _ => content.as_bytes().to_vec(),
    };
    Ok(UploadFile::new(name, bytes))
}
