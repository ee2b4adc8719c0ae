// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Import/export codecs: property lines and nested JSON

use super::schema::{self, EntryMeta};
use super::value::ConfigValue;
use super::ConfigError;
use indexmap::IndexMap;
use serde::Serialize;

pub(super) const JSON_VERSION: u64 = 1;

/// Render every schema key in declared order as `key=value` lines.
///
/// The output is a pure function of the current values, so
/// export -> import -> export is byte-identical.
pub(super) fn render_properties(get: impl Fn(&'static EntryMeta) -> ConfigValue) -> String {
    let mut out = String::new();
    for meta in schema::SCHEMA {
        out.push_str(meta.key);
        out.push('=');
        out.push_str(&get(meta).render());
        out.push('\n');
    }
    out
}

/// Parse property lines; unknown keys are skipped and counted.
pub(super) fn parse_properties(
    text: &str,
) -> Result<(Vec<(&'static EntryMeta, ConfigValue)>, usize), ConfigError> {
    let mut parsed = Vec::new();
    let mut skipped = 0;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, raw) = line
            .split_once('=')
            .ok_or(ConfigError::MalformedLine(idx + 1))?;
        let Some(meta) = schema::entry(key.trim()) else {
            skipped += 1;
            continue;
        };
        let value = ConfigValue::parse(meta.kind, meta.key, raw)?;
        schema::validate(meta, &value)?;
        parsed.push((meta, value));
    }
    Ok((parsed, skipped))
}

#[derive(Serialize)]
struct JsonEntry {
    value: serde_json::Value,
    default: serde_json::Value,
    description: &'static str,
}

#[derive(Serialize)]
struct JsonDocument {
    version: u64,
    categories: IndexMap<&'static str, IndexMap<&'static str, JsonEntry>>,
}

/// Render the nested JSON form
/// `{version, categories:{cat:{key:{value,default,description}}}}`.
pub(super) fn render_json(
    get: impl Fn(&'static EntryMeta) -> ConfigValue,
) -> Result<String, ConfigError> {
    let mut categories: IndexMap<&'static str, IndexMap<&'static str, JsonEntry>> =
        IndexMap::new();
    for meta in schema::SCHEMA {
        categories.entry(meta.category.as_str()).or_default().insert(
            meta.key,
            JsonEntry {
                value: get(meta).to_json(),
                default: (meta.default)().to_json(),
                description: meta.description,
            },
        );
    }
    let doc = JsonDocument {
        version: JSON_VERSION,
        categories,
    };
    let mut text = serde_json::to_string_pretty(&doc)?;
    text.push('\n');
    Ok(text)
}

/// Parse the nested JSON form; unknown keys are skipped and counted.
pub(super) fn parse_json(
    text: &str,
) -> Result<(Vec<(&'static EntryMeta, ConfigValue)>, usize), ConfigError> {
    let doc: serde_json::Value = serde_json::from_str(text)?;
    let version = doc
        .get("version")
        .and_then(|v| v.as_u64())
        .unwrap_or_default();
    if version != JSON_VERSION {
        return Err(ConfigError::UnsupportedVersion(version));
    }
    let mut parsed = Vec::new();
    let mut skipped = 0;
    let categories = doc
        .get("categories")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    for (_, entries) in categories {
        let Some(entries) = entries.as_object() else {
            continue;
        };
        for (key, body) in entries {
            let Some(meta) = schema::entry(key) else {
                skipped += 1;
                continue;
            };
            let Some(raw) = body.get("value") else {
                skipped += 1;
                continue;
            };
            let value = ConfigValue::from_json(meta.kind, meta.key, raw)?;
            schema::validate(meta, &value)?;
            parsed.push((meta, value));
        }
    }
    Ok((parsed, skipped))
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
