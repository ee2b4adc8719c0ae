// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config value representation and the typed-entry bridge

use super::ConfigError;
use std::fmt;

/// Value kinds a config entry can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Long,
    Bool,
    Str,
    List,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Bool => "bool",
            ValueKind::Str => "string",
            ValueKind::List => "string-list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dynamically-typed config value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i32),
    Long(i64),
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Int(_) => ValueKind::Int,
            ConfigValue::Long(_) => ValueKind::Long,
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Str(_) => ValueKind::Str,
            ConfigValue::List(_) => ValueKind::List,
        }
    }

    /// Property-line rendering; lists join on `,`.
    pub fn render(&self) -> String {
        match self {
            ConfigValue::Int(v) => v.to_string(),
            ConfigValue::Long(v) => v.to_string(),
            ConfigValue::Bool(v) => v.to_string(),
            ConfigValue::Str(v) => v.clone(),
            ConfigValue::List(items) => items.join(","),
        }
    }

    /// Parse a property-line value against the declared kind.
    pub fn parse(kind: ValueKind, key: &str, raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let mismatch = |got: &str| ConfigError::TypeMismatch {
            key: key.to_string(),
            expected: kind.as_str(),
            got: got.to_string(),
        };
        match kind {
            ValueKind::Int => raw
                .parse::<i32>()
                .map(ConfigValue::Int)
                .map_err(|_| mismatch(raw)),
            ValueKind::Long => raw
                .parse::<i64>()
                .map(ConfigValue::Long)
                .map_err(|_| mismatch(raw)),
            ValueKind::Bool => match raw {
                "true" => Ok(ConfigValue::Bool(true)),
                "false" => Ok(ConfigValue::Bool(false)),
                other => Err(mismatch(other)),
            },
            ValueKind::Str => Ok(ConfigValue::Str(raw.to_string())),
            ValueKind::List => Ok(ConfigValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigValue::Int(v) => (*v).into(),
            ConfigValue::Long(v) => (*v).into(),
            ConfigValue::Bool(v) => (*v).into(),
            ConfigValue::Str(v) => v.clone().into(),
            ConfigValue::List(items) => items.clone().into(),
        }
    }

    pub fn from_json(
        kind: ValueKind,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<Self, ConfigError> {
        let mismatch = || ConfigError::TypeMismatch {
            key: key.to_string(),
            expected: kind.as_str(),
            got: value.to_string(),
        };
        match kind {
            ValueKind::Int => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(ConfigValue::Int)
                .ok_or_else(mismatch),
            ValueKind::Long => value.as_i64().map(ConfigValue::Long).ok_or_else(mismatch),
            ValueKind::Bool => value.as_bool().map(ConfigValue::Bool).ok_or_else(mismatch),
            ValueKind::Str => value
                .as_str()
                .map(|s| ConfigValue::Str(s.to_string()))
                .ok_or_else(mismatch),
            ValueKind::List => value
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .map(|v| v.as_str().map(String::from))
                        .collect::<Option<Vec<_>>>()
                })
                .map(ConfigValue::List)
                .ok_or_else(mismatch),
        }
    }
}

/// Rust types usable as config entry values.
pub trait ConfigType: Sized {
    const KIND: ValueKind;
    fn into_value(self) -> ConfigValue;
    fn from_value(value: &ConfigValue) -> Option<Self>;
}

impl ConfigType for i32 {
    const KIND: ValueKind = ValueKind::Int;
    fn into_value(self) -> ConfigValue {
        ConfigValue::Int(self)
    }
    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl ConfigType for i64 {
    const KIND: ValueKind = ValueKind::Long;
    fn into_value(self) -> ConfigValue {
        ConfigValue::Long(self)
    }
    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl ConfigType for bool {
    const KIND: ValueKind = ValueKind::Bool;
    fn into_value(self) -> ConfigValue {
        ConfigValue::Bool(self)
    }
    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl ConfigType for String {
    const KIND: ValueKind = ValueKind::Str;
    fn into_value(self) -> ConfigValue {
        ConfigValue::Str(self)
    }
    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ConfigType for Vec<String> {
    const KIND: ValueKind = ValueKind::List;
    fn into_value(self) -> ConfigValue {
        ConfigValue::List(self)
    }
    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::List(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
