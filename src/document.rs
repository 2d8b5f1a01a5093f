//! A whole app in source shape, and the conversion to and from an archive.
//!
//! Reading an archive splits every control file into a tree plus editor
//! state, then runs the transform pipeline's `after_read`. Writing clones
//! the document, runs `before_write` on the clone and rebuilds every entry.
//! Entries the document does not model are carried through untouched.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::archive::entries::{
    COMPONENTS_DIR, CONNECTIONS, CONTROLS_DIR, DATA_SOURCES, HEADER, PROPERTIES, RESOURCES, TEMPLATES,
    THEMES,
};
use crate::archive::{ArchiveStore, ControlFile, MemoryArchive, control_from_json, control_to_json};
use crate::error::{Result, SourceError};
use crate::ir::{ControlNode, EditorStateStore, Entropy};
use crate::templates::{TemplateStore, TemplatesManifest};
use crate::theme::ThemesManifest;
use crate::transforms::{SourceTransformPipeline, TransformContext};

/// `Header.json`: format versions and analysis flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    #[serde(default)]
    pub doc_version: String,
    #[serde(default)]
    pub min_version_to_load: String,
    #[serde(default, rename = "MSAppStructureVersion")]
    pub msapp_structure_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_options: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `Properties.json`: app-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "FileID", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_app_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_layout_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_layout_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_layout_orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_layout_maintain_aspect_ratio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_layout_lock_orientation: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSourceJson {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `References/DataSources.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSourcesManifest {
    #[serde(default)]
    pub data_sources: Vec<DataSourceJson>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceJson {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `References/Resources.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourcesManifest {
    #[serde(default)]
    pub resources: Vec<ResourceJson>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppDocument {
    pub header: Header,
    pub properties: DocumentProperties,
    /// Top-level controls in screen order.
    pub screens: Vec<ControlNode>,
    pub components: Vec<ControlNode>,
    pub editor_states: EditorStateStore,
    pub templates: TemplateStore,
    pub themes: Option<ThemesManifest>,
    pub data_sources: Option<DataSourcesManifest>,
    pub resources: Option<ResourcesManifest>,
    /// Connection id → connection object.
    pub connections: Option<IndexMap<String, Value>>,
    pub entropy: Entropy,
    /// Entries passed through verbatim.
    pub other_entries: MemoryArchive,
}

fn take_json<T: DeserializeOwned>(archive: &mut MemoryArchive, path: &str) -> Result<Option<T>> {
    match archive.take_entry(path) {
        Some(entry) => serde_json::from_slice(&entry.bytes)
            .map(Some)
            .map_err(|e| SourceError::json(entry.path, e)),
        None => Ok(None),
    }
}

fn required_json<T: DeserializeOwned>(archive: &mut MemoryArchive, path: &str) -> Result<T> {
    take_json(archive, path)?
        .ok_or_else(|| SourceError::unsupported(path, "entry missing, not an app archive"))
}

fn to_json_bytes<T: Serialize>(path: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| SourceError::json(path, e))
}

impl AppDocument {
    /// Split an archive into a source-shape document.
    #[instrument(skip_all, fields(entries = archive.len()))]
    pub fn from_archive(archive: &MemoryArchive, pipeline: &SourceTransformPipeline) -> Result<Self> {
        let mut rest = archive.clone();

        let header = required_json(&mut rest, HEADER)?;
        let properties = required_json(&mut rest, PROPERTIES)?;
        let templates = match take_json::<TemplatesManifest>(&mut rest, TEMPLATES)? {
            Some(manifest) => TemplateStore::from_manifest(manifest)?,
            None => TemplateStore::new(),
        };

        let mut doc = AppDocument {
            header,
            properties,
            themes: take_json(&mut rest, THEMES)?,
            data_sources: take_json(&mut rest, DATA_SOURCES)?,
            resources: take_json(&mut rest, RESOURCES)?,
            connections: take_json(&mut rest, CONNECTIONS)?,
            templates,
            ..AppDocument::default()
        };

        doc.screens = doc.read_controls(&mut rest, CONTROLS_DIR)?;
        doc.components = doc.read_controls(&mut rest, COMPONENTS_DIR)?;
        doc.other_entries = rest;
        debug!(
            screens = doc.screens.len(),
            components = doc.components.len(),
            passthrough = doc.other_entries.len(),
            "archive split"
        );

        let theme = doc.themes.as_ref().and_then(ThemesManifest::current);
        let mut ctx = TransformContext::new(
            &mut doc.templates,
            theme,
            &mut doc.editor_states,
            &mut doc.entropy,
        );
        pipeline.after_read_document(&mut doc.components, &mut doc.screens, &mut ctx)?;
        Ok(doc)
    }

    fn read_controls(&mut self, archive: &mut MemoryArchive, dir: &str) -> Result<Vec<ControlNode>> {
        let paths: Vec<String> = archive
            .enumerate_entries(dir, ".json")
            .into_iter()
            .map(|e| e.path.clone())
            .collect();

        let mut roots = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(file) = take_json::<ControlFile>(archive, &path)? else {
                continue;
            };
            let root = control_from_json(file.top_parent, &path, &self.templates, &mut self.editor_states)?;
            self.entropy.record_entry(&root.name, &path);
            roots.push(root);
        }
        Ok(roots)
    }

    /// Rebuild the archive. The document itself is left in source shape.
    #[instrument(skip_all)]
    pub fn to_archive(&self, pipeline: &SourceTransformPipeline) -> Result<MemoryArchive> {
        let mut doc = self.clone();
        let theme = doc.themes.as_ref().and_then(ThemesManifest::current);
        let mut ctx = TransformContext::new(
            &mut doc.templates,
            theme,
            &mut doc.editor_states,
            &mut doc.entropy,
        );
        pipeline.before_write_document(&mut doc.components, &mut doc.screens, &mut ctx)?;

        let mut archive = MemoryArchive::new();
        archive.create_entry(HEADER, to_json_bytes(HEADER, &doc.header)?)?;
        archive.create_entry(PROPERTIES, to_json_bytes(PROPERTIES, &doc.properties)?)?;
        doc.write_controls(&mut archive, &doc.screens, CONTROLS_DIR)?;
        doc.write_controls(&mut archive, &doc.components, COMPONENTS_DIR)?;
        archive.create_entry(TEMPLATES, to_json_bytes(TEMPLATES, &doc.templates.to_manifest())?)?;
        if let Some(themes) = &doc.themes {
            archive.create_entry(THEMES, to_json_bytes(THEMES, themes)?)?;
        }
        if let Some(sources) = &doc.data_sources {
            archive.create_entry(DATA_SOURCES, to_json_bytes(DATA_SOURCES, sources)?)?;
        }
        if let Some(resources) = &doc.resources {
            archive.create_entry(RESOURCES, to_json_bytes(RESOURCES, resources)?)?;
        }
        if let Some(connections) = &doc.connections {
            archive.create_entry(CONNECTIONS, to_json_bytes(CONNECTIONS, connections)?)?;
        }
        for entry in doc.other_entries.iter() {
            archive.create_entry(&entry.path, entry.bytes.clone())?;
        }
        Ok(archive)
    }

    fn write_controls(&self, archive: &mut MemoryArchive, roots: &[ControlNode], dir: &str) -> Result<()> {
        let mut taken: BTreeSet<u64> = roots
            .iter()
            .filter_map(|r| self.editor_states.get(&r.name)?.unique_id.as_ref()?.parse().ok())
            .collect();

        for (position, root) in roots.iter().enumerate() {
            let path = match self.entropy.entry_for(&root.name) {
                Some(p) => p.to_string(),
                None => {
                    let id = match self.editor_states.get(&root.name).and_then(|e| e.unique_id.clone()) {
                        Some(id) => id,
                        None => {
                            let next = match taken.last() {
                                Some(n) => n.checked_add(1).ok_or_else(|| {
                                    SourceError::structural(dir, format!("no control id left after {n}"))
                                })?,
                                None => 1,
                            };
                            taken.insert(next);
                            next.to_string()
                        }
                    };
                    format!("{dir}{id}.json")
                }
            };
            let json = control_to_json(root, "", position, &path, &self.templates, &self.editor_states)?;
            let bytes = to_json_bytes(&path, &ControlFile { top_parent: json })?;
            archive.create_entry(&path, bytes)?;
        }
        Ok(())
    }

    pub fn screen_order(&self) -> Vec<String> {
        self.screens.iter().map(|s| s.name.clone()).collect()
    }

    pub fn screen(&self, name: &str) -> Option<&ControlNode> {
        self.screens.iter().find(|s| s.name == name)
    }

    pub fn screen_mut(&mut self, name: &str) -> Option<&mut ControlNode> {
        self.screens.iter_mut().find(|s| s.name == name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut ControlNode> {
        self.components.iter_mut().find(|c| c.name == name)
    }

    /// A screen or component root by name.
    pub fn root_mut(&mut self, name: &str) -> Option<&mut ControlNode> {
        self.screens
            .iter_mut()
            .chain(self.components.iter_mut())
            .find(|r| r.name == name)
    }

    /// Reject trees whose names collide anywhere in the document.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for root in self.screens.iter().chain(&self.components) {
            let file = self.entropy.entry_for(&root.name).unwrap_or(&root.name);
            root.validate(file)?;
            for name in root.names() {
                if !seen.insert(name.clone()) {
                    return Err(SourceError::structural(file, format!("duplicate control name '{name}'")));
                }
            }
        }
        Ok(())
    }
}
