//! Values with no home in the editable text that a faithful re-pack needs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entropy {
    /// Component name → template name it had in the archive.
    #[serde(default)]
    pub component_template_ids: BTreeMap<String, String>,
    /// Root control name → archive entry it was read from.
    #[serde(default)]
    pub control_entries: BTreeMap<String, String>,
}

impl Entropy {
    pub fn record_component_id(&mut self, component: &str, template_id: &str) {
        self.component_template_ids
            .insert(component.to_string(), template_id.to_string());
    }

    pub fn component_id(&self, component: &str) -> Option<&str> {
        self.component_template_ids
            .get(component)
            .map(String::as_str)
    }

    pub fn record_entry(&mut self, control: &str, entry: &str) {
        self.control_entries
            .insert(control.to_string(), entry.to_string());
    }

    pub fn entry_for(&self, control: &str) -> Option<&str> {
        self.control_entries.get(control).map(String::as_str)
    }
}
