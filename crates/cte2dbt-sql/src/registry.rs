//! Source registry
//!
//! Deduplicates external tables across every unit of one decomposition, so
//! that all references to the same physical table render to the same
//! placeholder and the renderer runs once per table.

use crate::tree::TableRef;
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One registered source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Rendered placeholder for the table
    pub placeholder: String,

    /// First reference that produced the entry (`None` for seeded entries)
    pub table: Option<TableRef>,
}

/// Qualified table key -> rendered placeholder
///
/// Write-once per key and append-only; iteration follows first
/// registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistry {
    entries: IndexMap<String, SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled from an earlier run
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut registry = Self::new();
        for (key, placeholder) in pairs {
            registry.seed(key, placeholder);
        }
        registry
    }

    /// Register a placeholder without a renderer call
    ///
    /// Returns `false` and keeps the existing placeholder when the key is
    /// already registered.
    pub fn seed(&mut self, key: impl Into<String>, placeholder: impl Into<String>) -> bool {
        match self.entries.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(SourceEntry {
                    placeholder: placeholder.into(),
                    table: None,
                });
                true
            }
        }
    }

    /// Placeholder registered for `key`, computing and storing it first if
    /// the key is new
    ///
    /// `render` is only called for new keys. When it fails nothing is stored.
    pub fn get_or_try_insert_with<E, F>(
        &mut self,
        key: String,
        table: &TableRef,
        render: F,
    ) -> Result<&str, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut().placeholder.as_str()),
            Entry::Vacant(entry) => {
                let placeholder = render()?;
                info!(key = %entry.key(), %placeholder, "Registered new source");

                let entry = entry.insert(SourceEntry {
                    placeholder,
                    table: Some(table.clone()),
                });
                Ok(entry.placeholder.as_str())
            }
        }
    }

    /// Placeholder registered for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.placeholder.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, placeholder)` pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.as_str(), entry.placeholder.as_str()))
    }

    /// Full entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &SourceEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }
}
