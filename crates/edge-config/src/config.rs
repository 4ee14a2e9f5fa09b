use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::static_config::{
    StaticConfigItem, DEFAULT_REWRITE_DESTINATION, DEFAULT_REWRITE_SOURCE, STATIC_CONFIG_TABLE,
};

/// Point in routing at which a rewrite is consulted, relative to static files.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewritePhase {
    BeforeFiles,
    #[default]
    AfterFiles,
    Fallback,
}

impl RewritePhase {
    pub const ALL: [RewritePhase; 3] = [
        RewritePhase::BeforeFiles,
        RewritePhase::AfterFiles,
        RewritePhase::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RewritePhase::BeforeFiles => "before_files",
            RewritePhase::AfterFiles => "after_files",
            RewritePhase::Fallback => "fallback",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteSpec {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub phase: RewritePhase,
}

impl RewriteSpec {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            phase: RewritePhase::AfterFiles,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    values: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    rewrites: Option<Vec<RewriteSpec>>,
}

impl SystemConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get(key)
            .map(str::to_string)
            .or_else(|| default_value(key))
            .unwrap_or_default()
    }

    pub fn get_number(&self, key: &str) -> i64 {
        self.get(key)
            .and_then(|value| value.parse::<i64>().ok())
            .or_else(|| default_value(key).and_then(|value| value.parse::<i64>().ok()))
            .unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .and_then(parse_bool)
            .or_else(|| default_value(key).and_then(|value| parse_bool(&value)))
            .unwrap_or(false)
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.lists.get(key) {
            Some(values) => values.clone(),
            None => default_value(key)
                .map(|value| split_list(&value))
                .unwrap_or_default(),
        }
    }

    pub fn get_number_list(&self, key: &str) -> Vec<i64> {
        self.get_list(key)
            .iter()
            .filter_map(|value| value.parse::<i64>().ok())
            .collect()
    }

    /// Configured rewrite rules, or the built-in `/api` rule when the file has no
    /// `rewrites` entry. An explicit empty list disables rewriting.
    pub fn rewrites(&self) -> Vec<RewriteSpec> {
        match &self.rewrites {
            Some(specs) => specs.clone(),
            None => vec![RewriteSpec::new(
                DEFAULT_REWRITE_SOURCE,
                DEFAULT_REWRITE_DESTINATION,
            )],
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.values
            .keys()
            .chain(self.lists.keys())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("type mismatch for key {0}: expected {1}")]
    TypeMismatch(String, String),
    #[error("invalid rewrites entry: {0}")]
    InvalidRewrite(String),
}

pub struct SystemConfigLoader;

impl SystemConfigLoader {
    pub fn from_str(input: &str) -> Result<SystemConfig, ConfigError> {
        let value: toml::Value =
            toml::from_str(input).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let mut table = match value {
            toml::Value::Table(table) => table,
            _ => return Err(ConfigError::Parse("expected a table at top level".to_string())),
        };
        let rewrites = table.remove("rewrites").map(parse_rewrites).transpose()?;

        let mut config = SystemConfig {
            rewrites,
            ..SystemConfig::default()
        };
        let mut errors = Vec::new();
        flatten_values(&mut config, String::new(), &toml::Value::Table(table), &mut errors);
        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }
        Ok(config)
    }
}

/// Accepts either a plain array (every rule in the after-files phase) or a table
/// keyed by phase, each holding an array of rules.
fn parse_rewrites(value: toml::Value) -> Result<Vec<RewriteSpec>, ConfigError> {
    match value {
        toml::Value::Array(items) => toml::Value::Array(items)
            .try_into::<Vec<RewriteSpec>>()
            .map_err(|err| ConfigError::InvalidRewrite(err.to_string())),
        toml::Value::Table(mut table) => {
            let mut specs = Vec::new();
            for phase in RewritePhase::ALL {
                let Some(entries) = table.remove(phase.as_str()) else {
                    continue;
                };
                let entries: Vec<RewriteSpec> = entries
                    .try_into()
                    .map_err(|err: toml::de::Error| ConfigError::InvalidRewrite(err.to_string()))?;
                specs.extend(entries.into_iter().map(|spec| RewriteSpec { phase, ..spec }));
            }
            if let Some(key) = table.keys().next() {
                return Err(ConfigError::UnknownKey(format!("rewrites.{key}")));
            }
            Ok(specs)
        }
        _ => Err(ConfigError::InvalidRewrite(
            "expected an array of rules or a table of phases".to_string(),
        )),
    }
}

fn flatten_values(
    output: &mut SystemConfig,
    prefix: String,
    value: &toml::Value,
    errors: &mut Vec<ConfigError>,
) {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                let new_prefix = if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_values(output, new_prefix, nested, errors);
            }
        }
        toml::Value::String(value) => {
            insert_checked(output, &prefix, value.to_string(), "string", errors);
        }
        toml::Value::Integer(value) => {
            insert_checked(output, &prefix, value.to_string(), "number", errors);
        }
        toml::Value::Float(value) => {
            insert_checked(output, &prefix, value.to_string(), "number", errors);
        }
        toml::Value::Boolean(value) => {
            insert_checked(output, &prefix, value.to_string(), "boolean", errors);
        }
        toml::Value::Array(items) => insert_list(output, &prefix, items, errors),
        _ => {
            errors.push(ConfigError::TypeMismatch(prefix, "string|number|boolean|list".to_string()));
        }
    }
}

fn insert_checked(
    output: &mut SystemConfig,
    key: &str,
    value: String,
    expected_type: &str,
    errors: &mut Vec<ConfigError>,
) {
    let Some(item) = config_item(key) else {
        errors.push(ConfigError::UnknownKey(key.to_string()));
        return;
    };
    if item.value_type != expected_type {
        errors.push(ConfigError::TypeMismatch(key.to_string(), item.value_type.to_string()));
        return;
    }
    output.values.insert(key.to_string(), value);
}

fn insert_list(
    output: &mut SystemConfig,
    key: &str,
    items: &[toml::Value],
    errors: &mut Vec<ConfigError>,
) {
    let Some(item) = config_item(key) else {
        errors.push(ConfigError::UnknownKey(key.to_string()));
        return;
    };
    let values: Option<Vec<String>> = match item.value_type {
        "string_list" => items
            .iter()
            .map(|value| value.as_str().map(str::to_string))
            .collect(),
        "number_list" => items
            .iter()
            .map(|value| value.as_integer().filter(|n| *n >= 0).map(|n| n.to_string()))
            .collect(),
        _ => None,
    };
    match values {
        Some(values) => {
            output.lists.insert(key.to_string(), values);
        }
        None => {
            errors.push(ConfigError::TypeMismatch(key.to_string(), item.value_type.to_string()));
        }
    }
}

fn config_item(key: &str) -> Option<&'static StaticConfigItem> {
    STATIC_CONFIG_TABLE.iter().find(|item| item.key == key)
}

fn default_value(key: &str) -> Option<String> {
    config_item(key).map(|item| item.default_value.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Config file written on first start; reproduces the built-in defaults.
pub fn default_config_template() -> String {
    let mut lines = Vec::new();
    lines.push("server = { listen = \"0.0.0.0:3000\" }".to_string());
    lines.push("app = { react_strict_mode = true }".to_string());
    lines.push("proxy = { timeout_ms = 30000, xfwd = true, user_agent = \"\" }".to_string());
    lines.push("images = { domains = [\"172.17.0.2\"] }".to_string());
    lines.push(String::new());
    lines.push("[[rewrites]]".to_string());
    lines.push(format!("source = \"{DEFAULT_REWRITE_SOURCE}\""));
    lines.push(format!("destination = \"{DEFAULT_REWRITE_DESTINATION}\""));
    format!("{}\n", lines.join("\n"))
}
