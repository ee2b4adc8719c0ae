// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The live configuration store

use super::format;
use super::schema::{self, Entry, EntryMeta};
use super::value::{ConfigType, ConfigValue};
use super::ConfigError;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type ChangeListener = Box<dyn Fn(&'static str) + Send + Sync>;

/// Typed key/value store backed by an optional property file.
///
/// Reads take a shared lock; writes are serialized and persist before
/// returning, so an observer reading right after `set` returns sees the new
/// value.
pub struct ConfigStore {
    values: RwLock<HashMap<&'static str, ConfigValue>>,
    path: Option<PathBuf>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl ConfigStore {
    /// In-memory store seeded with schema defaults.
    pub fn in_memory() -> Self {
        Self {
            values: RwLock::new(Self::defaults()),
            path: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// File-backed store; loads the property file when it exists.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let store = Self {
            values: RwLock::new(Self::defaults()),
            path: Some(path.clone()),
            listeners: Mutex::new(Vec::new()),
        };
        if path.exists() {
            let text = fs::read_to_string(&path)?;
            let skipped = store.apply_parsed(format::parse_properties(&text)?);
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "ignored unknown config keys");
            }
        }
        Ok(store)
    }

    fn defaults() -> HashMap<&'static str, ConfigValue> {
        schema::SCHEMA
            .iter()
            .map(|meta| (meta.key, (meta.default)()))
            .collect()
    }

    pub fn get<T: ConfigType>(&self, entry: &Entry<T>) -> T {
        let values = self.values.read();
        values
            .get(entry.key)
            .and_then(T::from_value)
            .unwrap_or_else(|| entry.default_value())
    }

    pub fn set<T: ConfigType>(&self, entry: &Entry<T>, value: T) -> Result<(), ConfigError> {
        let meta = schema::entry(entry.key)
            .ok_or_else(|| ConfigError::UnknownKey(entry.key.to_string()))?;
        let value = value.into_value();
        schema::validate(meta, &value)?;
        {
            let mut values = self.values.write();
            values.insert(entry.key, value);
        }
        self.persist()?;
        self.notify(entry.key);
        Ok(())
    }

    /// Set from untyped text, as the preferences UI does.
    pub fn set_raw(&self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let meta = schema::entry(key).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let value = ConfigValue::parse(meta.kind, meta.key, raw)?;
        schema::validate(meta, &value)?;
        {
            let mut values = self.values.write();
            values.insert(meta.key, value);
        }
        self.persist()?;
        self.notify(meta.key);
        Ok(())
    }

    pub fn reset<T: ConfigType>(&self, entry: &Entry<T>) -> Result<(), ConfigError> {
        let meta = schema::entry(entry.key)
            .ok_or_else(|| ConfigError::UnknownKey(entry.key.to_string()))?;
        {
            let mut values = self.values.write();
            values.insert(meta.key, (meta.default)());
        }
        self.persist()?;
        self.notify(meta.key);
        Ok(())
    }

    pub fn reset_all(&self) -> Result<(), ConfigError> {
        {
            let mut values = self.values.write();
            *values = Self::defaults();
        }
        self.persist()?;
        for meta in schema::SCHEMA {
            self.notify(meta.key);
        }
        Ok(())
    }

    /// Register a change listener, called with the key after each write.
    pub fn on_change(&self, listener: impl Fn(&'static str) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn export_properties(&self) -> String {
        format::render_properties(|meta| self.current(meta))
    }

    pub fn import_properties(&self, text: &str) -> Result<usize, ConfigError> {
        let (parsed, skipped) = format::parse_properties(text)?;
        let applied = parsed.len();
        let keys: Vec<_> = parsed.iter().map(|(meta, _)| meta.key).collect();
        self.apply_batch(parsed)?;
        for key in keys {
            self.notify(key);
        }
        if skipped > 0 {
            debug!(skipped, "import skipped unknown keys");
        }
        Ok(applied)
    }

    pub fn export_json(&self) -> Result<String, ConfigError> {
        format::render_json(|meta| self.current(meta))
    }

    pub fn import_json(&self, text: &str) -> Result<usize, ConfigError> {
        let (parsed, skipped) = format::parse_json(text)?;
        let applied = parsed.len();
        let keys: Vec<_> = parsed.iter().map(|(meta, _)| meta.key).collect();
        self.apply_batch(parsed)?;
        for key in keys {
            self.notify(key);
        }
        if skipped > 0 {
            debug!(skipped, "import skipped unknown keys");
        }
        Ok(applied)
    }

    fn current(&self, meta: &'static EntryMeta) -> ConfigValue {
        let values = self.values.read();
        values.get(meta.key).cloned().unwrap_or_else(|| (meta.default)())
    }

    fn apply_parsed(&self, parsed: (Vec<(&'static EntryMeta, ConfigValue)>, usize)) -> usize {
        let (entries, skipped) = parsed;
        let mut values = self.values.write();
        for (meta, value) in entries {
            values.insert(meta.key, value);
        }
        skipped
    }

    fn apply_batch(
        &self,
        entries: Vec<(&'static EntryMeta, ConfigValue)>,
    ) -> Result<(), ConfigError> {
        {
            let mut values = self.values.write();
            for (meta, value) in entries {
                values.insert(meta.key, value);
            }
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_atomic(path, &self.export_properties())?;
        Ok(())
    }

    fn notify(&self, key: &'static str) {
        for listener in self.listeners.lock().iter() {
            listener(key);
        }
    }
}

/// Write via a sibling temp file and rename so readers never observe a
/// partial file.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
