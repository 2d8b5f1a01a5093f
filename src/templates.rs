//! Control templates: the catalog that says what kind of thing a control is.
//!
//! Records come from `References/Templates.json`. Each carries its XML
//! definition verbatim; property defaults are read out of that XML once,
//! when the manifest is loaded.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Canvas,
    Data,
    Function,
    Command,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateRecord {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_component_template: bool,
    #[serde(default, rename = "ComponentType", skip_serializing_if = "Option::is_none")]
    pub component_kind: Option<ComponentKind>,
    /// XML widget definition, verbatim.
    #[serde(default, rename = "Template", skip_serializing_if = "Option::is_none")]
    pub template_xml: Option<String>,
    /// Property name → default expression, from `template_xml`.
    #[serde(skip)]
    pub default_values: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TemplateRecord {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            version: "1.0".to_string(),
            ..Self::default()
        }
    }

    pub fn with_default(mut self, property: &str, expression: &str) -> Self {
        self.default_values
            .insert(property.to_string(), expression.to_string());
        self
    }

    /// Fill `default_values` from the XML definition, if there is one.
    pub fn load_defaults(&mut self) -> Result<()> {
        if let Some(xml) = &self.template_xml {
            self.default_values = parse_default_values(xml)
                .map_err(|e| SourceError::parse(format!("template {}", self.name), None, e))?;
        }
        Ok(())
    }
}

/// Read `<property name=".." defaultValue=".."/>` pairs out of a template.
pub fn parse_default_values(xml: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut out = BTreeMap::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"property" => {
                if let Some((name, default)) = property_default(&e)? {
                    out.insert(name, default);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn property_default(e: &BytesStart<'_>) -> std::result::Result<Option<(String, String)>, String> {
    let mut name = None;
    let mut default = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        match attr.key.local_name().as_ref() {
            b"name" => name = Some(value.into_owned()),
            b"defaultValue" => default = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(name.zip(default))
}

/// `References/Templates.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplatesManifest {
    #[serde(default)]
    pub used_templates: Vec<TemplateRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Templates by name, in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateStore {
    by_name: IndexMap<String, TemplateRecord>,
    extra: Map<String, Value>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: TemplatesManifest) -> Result<Self> {
        let mut store = Self {
            by_name: IndexMap::new(),
            extra: manifest.extra,
        };
        for mut record in manifest.used_templates {
            record.load_defaults()?;
            store.add(record)?;
        }
        Ok(store)
    }

    pub fn to_manifest(&self) -> TemplatesManifest {
        TemplatesManifest {
            used_templates: self.by_name.values().cloned().collect(),
            extra: self.extra.clone(),
        }
    }

    pub fn add(&mut self, record: TemplateRecord) -> Result<()> {
        if self.by_name.contains_key(&record.name) {
            return Err(SourceError::structural(
                "References/Templates.json",
                format!("template '{}' listed twice", record.name),
            ));
        }
        self.by_name.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&TemplateRecord> {
        self.by_name.get(name)
    }

    /// First template with this id; several names may share one id.
    pub fn try_get_by_id(&self, id: &str) -> Option<&TemplateRecord> {
        self.by_name.values().find(|t| t.id == id)
    }

    /// Re-key a template, keeping its position. False if `old` is unknown
    /// or `new` is taken.
    pub fn try_rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.by_name.contains_key(old);
        }
        if self.by_name.contains_key(new) {
            return false;
        }
        let Some(idx) = self.by_name.get_index_of(old) else {
            return false;
        };
        let Some((_, mut record)) = self.by_name.shift_remove_index(idx) else {
            return false;
        };
        record.name = new.to_string();
        self.by_name.shift_insert(idx, new.to_string(), record);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
