//! Parsed, immutable view of the configuration file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::types::ConfigValue;
use crate::domain::{ConfigError, ConfigResult, LogLevel, RotationPolicy};

pub const KEY_LOG_LEVEL: &str = "log.level";
pub const KEY_ROTATE_FILENAME: &str = "logrotate.filename";
pub const KEY_ROTATE_MAX_SIZE: &str = "logrotate.maxsize";
pub const KEY_ROTATE_MAX_BACKUPS: &str = "logrotate.maxbackups";
pub const KEY_ROTATE_MAX_AGE: &str = "logrotate.maxage";
pub const KEY_ROTATE_COMPRESS: &str = "logrotate.compress";

/// Flat map of dotted, lower-cased keys to scalar values.
///
/// Lenient getters (`get_*`) return the zero value of the kind for a
/// missing or unconvertible key; strict getters (`try_get_*`) report why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(flatten)]
    values: BTreeMap<String, ConfigValue>,
}

impl Snapshot {
    /// Parse a YAML document read from `path`.
    pub fn parse(path: &Path, content: &str) -> ConfigResult<Self> {
        let mut snapshot = Self::from_yaml_str(content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        snapshot.path = Some(path.to_path_buf());
        Ok(snapshot)
    }

    /// Parse a YAML document without an origin path.
    ///
    /// An empty document yields an empty snapshot; the root must otherwise
    /// be a mapping.
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        let doc: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;

        let mut values = BTreeMap::new();
        match &doc {
            serde_yaml::Value::Null => {}
            serde_yaml::Value::Mapping(_) => flatten("", &doc, &mut values),
            other => {
                return Err(format!(
                    "top-level value must be a mapping, found {}",
                    yaml_kind(other)
                ))
            }
        }

        Ok(Self { path: None, values })
    }

    /// Build a snapshot from dotted keys, mainly for tests and defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ConfigValue>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
            .collect();
        Self { path: None, values }
    }

    /// File this snapshot was read from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(&key.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get(key).map(|v| v.to_string()).unwrap_or_default()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).and_then(ConfigValue::to_int).unwrap_or(0)
    }

    pub fn get_float(&self, key: &str) -> f64 {
        self.get(key).and_then(ConfigValue::to_float).unwrap_or(0.0)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(ConfigValue::to_bool).unwrap_or(false)
    }

    pub fn try_get_string(&self, key: &str) -> ConfigResult<String> {
        let value = self.require(key)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(key, "string", value))
    }

    pub fn try_get_int(&self, key: &str) -> ConfigResult<i64> {
        let value = self.require(key)?;
        value.to_int().ok_or_else(|| mismatch(key, "int", value))
    }

    pub fn try_get_float(&self, key: &str) -> ConfigResult<f64> {
        let value = self.require(key)?;
        value.to_float().ok_or_else(|| mismatch(key, "float", value))
    }

    pub fn try_get_bool(&self, key: &str) -> ConfigResult<bool> {
        let value = self.require(key)?;
        value.to_bool().ok_or_else(|| mismatch(key, "bool", value))
    }

    /// Level selected by `log.level`.
    ///
    /// A missing key reads as 0 (Info); out-of-range values fall back to
    /// Debug.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_config_value(self.get_int(KEY_LOG_LEVEL))
    }

    /// Rotation settings under `logrotate.*`.
    pub fn rotation_policy(&self) -> RotationPolicy {
        let defaults = RotationPolicy::default();
        let filename = self.get_string(KEY_ROTATE_FILENAME);
        let filename = filename.trim();

        RotationPolicy {
            filename: if filename.is_empty() {
                defaults.filename
            } else {
                PathBuf::from(filename)
            },
            max_size_mb: non_negative(self.get_int(KEY_ROTATE_MAX_SIZE)),
            max_backups: non_negative(self.get_int(KEY_ROTATE_MAX_BACKUPS)) as usize,
            max_age_days: non_negative(self.get_int(KEY_ROTATE_MAX_AGE)),
            compress: self.get_bool(KEY_ROTATE_COMPRESS),
        }
    }

    /// Render back to a nested YAML document.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum Node<'a> {
            Leaf(&'a ConfigValue),
            Branch(BTreeMap<&'a str, Node<'a>>),
        }

        let mut root: BTreeMap<&str, Node<'_>> = BTreeMap::new();
        for (key, value) in &self.values {
            let mut parts = key.split('.').peekable();
            let mut level = &mut root;
            while let Some(part) = parts.next() {
                if parts.peek().is_none() {
                    level.insert(part, Node::Leaf(value));
                    break;
                }
                let node = level
                    .entry(part)
                    .or_insert_with(|| Node::Branch(BTreeMap::new()));
                level = match node {
                    Node::Branch(children) => children,
                    Node::Leaf(_) => {
                        return Err(ConfigError::Invalid(format!(
                            "key {key} nests under a scalar value"
                        )))
                    }
                };
            }
        }

        serde_yaml::to_string(&root).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn require(&self, key: &str) -> ConfigResult<&ConfigValue> {
        self.get(key)
            .ok_or_else(|| ConfigError::KeyMissing(key.to_string()))
    }
}

fn mismatch(key: &str, expected: &'static str, value: &ConfigValue) -> ConfigError {
    ConfigError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: value.kind(),
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn flatten(prefix: &str, value: &serde_yaml::Value, out: &mut BTreeMap<String, ConfigValue>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key = match key_string(k) {
                    Some(k) => k.to_lowercase(),
                    None => continue,
                };
                let full = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&full, v, out);
            }
        }
        serde_yaml::Value::Tagged(tagged) => flatten(prefix, &tagged.value, out),
        scalar => {
            if let Some(v) = ConfigValue::from_yaml(scalar) {
                out.insert(prefix.to_string(), v);
            }
        }
    }
}

fn key_string(key: &serde_yaml::Value) -> Option<String> {
    ConfigValue::from_yaml(key).map(|v| v.to_string())
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}
