//! Out-of-band, editor-only control metadata.
//!
//! Nothing here changes how an app runs, but losing it would change the
//! archive. Entries are keyed by control name and must track the tree: a
//! rename or move of a node updates its entry.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SourceError};

/// Editor metadata for one rule (property) of a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleState {
    pub category: String,
    pub rule_provider_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RuleState {
    fn default() -> Self {
        Self {
            category: "Design".to_string(),
            rule_provider_type: "Unknown".to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EditorStateEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub style_name: String,
    /// Publish order among siblings as last seen in an archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<f64>,
    /// Sibling names a group control owns, in order. Only on groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_controls_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery_template_child_name: Option<String>,
    /// Rule metadata in archive order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub rules: IndexMap<String, RuleState>,
    /// Archive fields this crate does not model, carried through verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extension_data: Map<String, Value>,
}

impl EditorStateEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Flat name → entry store for a whole document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorStateStore {
    entries: IndexMap<String, EditorStateEntry>,
}

impl EditorStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a second entry for the same name is corruption.
    pub fn insert(&mut self, entry: EditorStateEntry) -> Result<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(SourceError::structural(
                "editor state",
                format!("duplicate editor state for control '{}'", entry.name),
            ));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Insert or overwrite.
    pub fn upsert(&mut self, entry: EditorStateEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&EditorStateEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EditorStateEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<EditorStateEntry> {
        self.entries.shift_remove(name)
    }

    /// Move an entry to a new key, keeping its position.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.entries.contains_key(new) {
            return Err(SourceError::structural(
                "editor state",
                format!("cannot rename '{old}' to existing control '{new}'"),
            ));
        }
        let Some(idx) = self.entries.get_index_of(old) else {
            return Ok(());
        };
        let Some((_, mut entry)) = self.entries.shift_remove_index(idx) else {
            return Ok(());
        };
        entry.name = new.to_string();
        self.entries.shift_insert(idx, new.to_string(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EditorStateEntry> {
        self.entries.values()
    }

    /// `base` if free, else the first free `base_1`, `base_2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.entries.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{base}_{i}"))
            .find(|candidate| !self.entries.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}
