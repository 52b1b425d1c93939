// src/module/params.rs

//! Module parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::errors::{CascadeError, Result};

/// Control parameter: bypass the duplicate-run check.
pub const FORCE_RUN: &str = "force_run";
/// Control parameter: stop after `init` and mark the module `Skipped`.
pub const DRY_RUN: &str = "dry_run";

/// String-keyed parameter map.
///
/// Keys are kept sorted so that serialising the map is canonical; nested
/// objects use `serde_json::Map`, which is sorted as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Store any serialisable value.
    ///
    /// Values that `serde_json` cannot represent (non-finite floats, maps with
    /// non-string keys, ...) are stored as their `Display` form instead.
    pub fn set_serialized<T>(&mut self, key: impl Into<String>, value: &T)
    where
        T: Serialize + fmt::Display + ?Sized,
    {
        let value = serde_json::to_value(value)
            .ok()
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Interpret a parameter as a flag. Missing or non-boolean values are `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn force_run(&self) -> bool {
        self.flag(FORCE_RUN)
    }

    pub fn dry_run(&self) -> bool {
        self.flag(DRY_RUN)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: Parameters) {
        self.values.extend(other.values);
    }

    /// Snapshot as a JSON object (used for run logs and hashing).
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Build parameters from a JSON object. Anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                values: map.into_iter().collect(),
            }),
            Value::Null => Ok(Self::new()),
            other => Err(CascadeError::Config(format!(
                "parameters must be a mapping, got {other}"
            ))),
        }
    }

    /// Bulk-load parameters from a structured-text file.
    ///
    /// The format is chosen by extension: `.toml`, `.yaml`/`.yml` or `.json`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let value: Value = match ext.as_deref() {
            Some("toml") => {
                let table: toml::Table = toml::from_str(&contents)?;
                serde_json::to_value(table)?
            }
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            Some("json") => serde_json::from_str(&contents)?,
            _ => {
                return Err(CascadeError::Config(format!(
                    "unsupported parameter file extension: {:?} \
                     (expected .toml, .yaml, .yml or .json)",
                    path
                )));
            }
        };

        Self::from_value(value)
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
