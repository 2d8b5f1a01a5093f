//! Edits replayed onto a document during a three-way merge.
//!
//! Every delta is best-effort: the document it lands on may have moved on
//! since the delta was computed, so a missing target is logged and skipped
//! instead of failing the merge.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;
use tracing::debug;

use crate::document::{AppDocument, DataSourceJson, DataSourcesManifest, DocumentProperties, ResourceJson, ResourcesManifest};
use crate::ir::{ControlNode, ControlPath, EditorStateEntry, FunctionDef, Property};
use crate::templates::TemplateRecord;
use crate::theme::ThemesManifest;

#[derive(Debug, Clone, PartialEq)]
pub enum PendingDelta {
    /// Add `control` under `parent`; an empty parent adds a new root.
    AddControl {
        parent: ControlPath,
        control: ControlNode,
        /// Editor state for the subtree, keyed by its incoming names.
        editor_states: Vec<EditorStateEntry>,
        is_component: bool,
    },
    RemoveControl {
        path: ControlPath,
    },
    /// `None` removes the property.
    ChangeProperty {
        path: ControlPath,
        property: String,
        value: Option<Property>,
    },
    /// `None` body removes the function.
    ChangeComponentFunction {
        path: ControlPath,
        function: String,
        body: Option<String>,
    },
    AddTemplate {
        template: TemplateRecord,
    },
    ScreenOrderChange {
        order: Vec<String>,
    },
    ThemeChange {
        themes: ThemesManifest,
    },
    AddConnection {
        id: String,
        connection: Value,
    },
    RemoveConnection {
        id: String,
    },
    AddDataSource {
        source: DataSourceJson,
    },
    AddResource {
        resource: ResourceJson,
    },
    RemoveResource {
        name: String,
    },
    UpdateResource {
        resource: ResourceJson,
    },
    DocumentPropertyChange {
        property: String,
        value: Value,
    },
}

type PropertySetter = fn(&mut DocumentProperties, &Value) -> bool;

/// `Properties.json` fields settable by name. Names not listed here land in
/// the pass-through map.
static PROPERTY_SETTERS: &[(&str, PropertySetter)] = &[
    ("Author", |p, v| set_string(&mut p.author, v)),
    ("Name", |p, v| set_string(&mut p.name, v)),
    ("Id", |p, v| set_string(&mut p.id, v)),
    ("FileID", |p, v| set_string(&mut p.file_id, v)),
    ("AppDescription", |p, v| set_string(&mut p.app_description, v)),
    ("DocumentAppType", |p, v| set_string(&mut p.document_app_type, v)),
    ("DocumentLayoutWidth", |p, v| set_u32(&mut p.document_layout_width, v)),
    ("DocumentLayoutHeight", |p, v| set_u32(&mut p.document_layout_height, v)),
    ("DocumentLayoutOrientation", |p, v| set_string(&mut p.document_layout_orientation, v)),
    ("DocumentLayoutMaintainAspectRatio", |p, v| {
        set_bool(&mut p.document_layout_maintain_aspect_ratio, v)
    }),
    ("DocumentLayoutLockOrientation", |p, v| {
        set_bool(&mut p.document_layout_lock_orientation, v)
    }),
];

fn set_string(slot: &mut Option<String>, value: &Value) -> bool {
    match value {
        Value::String(s) => *slot = Some(s.clone()),
        Value::Null => *slot = None,
        _ => return false,
    }
    true
}

fn set_u32(slot: &mut Option<u32>, value: &Value) -> bool {
    match value {
        Value::Null => *slot = None,
        v => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => *slot = Some(n),
            None => return false,
        },
    }
    true
}

fn set_bool(slot: &mut Option<bool>, value: &Value) -> bool {
    match value {
        Value::Bool(b) => *slot = Some(*b),
        Value::Null => *slot = None,
        _ => return false,
    }
    true
}

/// Set one document property by its archive name.
pub fn set_document_property(props: &mut DocumentProperties, name: &str, value: &Value) -> bool {
    if let Some((_, setter)) = PROPERTY_SETTERS.iter().find(|(n, _)| *n == name) {
        return setter(props, value);
    }
    if value.is_null() {
        props.extra.remove(name);
    } else {
        props.extra.insert(name.to_string(), value.clone());
    }
    true
}

fn descend<'a>(node: &'a mut ControlNode, path: &ControlPath) -> Option<&'a mut ControlNode> {
    if path.is_empty() {
        return Some(node);
    }
    let child = node.child_mut(path.current())?;
    descend(child, &path.next())
}

/// The node a path names: first segment is a screen or component.
fn resolve_mut<'a>(doc: &'a mut AppDocument, path: &ControlPath) -> Option<&'a mut ControlNode> {
    let root = doc.root_mut(path.current())?;
    descend(root, &path.next())
}

/// Names the incoming subtree may not take.
fn taken_names(doc: &AppDocument) -> HashSet<String> {
    doc.screens
        .iter()
        .chain(&doc.components)
        .flat_map(ControlNode::names)
        .chain(doc.editor_states.iter().map(|e| e.name.clone()))
        .collect()
}

fn unique_name(taken: &HashSet<String>, base: &str) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}_{i}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Give every node of `node` a name free in `taken`. Returns old → new.
fn rename_subtree(node: &mut ControlNode, taken: &mut HashSet<String>, renames: &mut BTreeMap<String, String>) {
    let fresh = unique_name(taken, &node.name);
    taken.insert(fresh.clone());
    if fresh != node.name {
        renames.insert(node.name.clone(), fresh.clone());
        node.name = fresh;
    }
    for c in &mut node.children {
        rename_subtree(c, taken, renames);
    }
}

fn rename_entry(mut entry: EditorStateEntry, renames: &BTreeMap<String, String>) -> EditorStateEntry {
    let renamed = |n: &String| renames.get(n).cloned().unwrap_or_else(|| n.clone());
    entry.name = renamed(&entry.name);
    if let Some(key) = &mut entry.grouped_controls_key {
        *key = key.iter().map(renamed).collect();
    }
    if let Some(row) = &entry.gallery_template_child_name {
        entry.gallery_template_child_name = Some(renamed(row));
    }
    entry
}

impl PendingDelta {
    /// Apply to `doc`. False when the target was missing or the value did
    /// not fit, in which case the document is unchanged.
    pub fn apply(&self, doc: &mut AppDocument) -> bool {
        let applied = self.apply_inner(doc);
        if !applied {
            debug!(delta = self.kind(), "delta target missing, skipped");
        }
        applied
    }

    fn kind(&self) -> &'static str {
        match self {
            PendingDelta::AddControl { .. } => "AddControl",
            PendingDelta::RemoveControl { .. } => "RemoveControl",
            PendingDelta::ChangeProperty { .. } => "ChangeProperty",
            PendingDelta::ChangeComponentFunction { .. } => "ChangeComponentFunction",
            PendingDelta::AddTemplate { .. } => "AddTemplate",
            PendingDelta::ScreenOrderChange { .. } => "ScreenOrderChange",
            PendingDelta::ThemeChange { .. } => "ThemeChange",
            PendingDelta::AddConnection { .. } => "AddConnection",
            PendingDelta::RemoveConnection { .. } => "RemoveConnection",
            PendingDelta::AddDataSource { .. } => "AddDataSource",
            PendingDelta::AddResource { .. } => "AddResource",
            PendingDelta::RemoveResource { .. } => "RemoveResource",
            PendingDelta::UpdateResource { .. } => "UpdateResource",
            PendingDelta::DocumentPropertyChange { .. } => "DocumentPropertyChange",
        }
    }

    fn apply_inner(&self, doc: &mut AppDocument) -> bool {
        match self {
            PendingDelta::AddControl {
                parent,
                control,
                editor_states,
                is_component,
            } => add_control(doc, parent, control, editor_states, *is_component),
            PendingDelta::RemoveControl { path } => remove_control(doc, path),
            PendingDelta::ChangeProperty {
                path,
                property,
                value,
            } => {
                let Some(node) = resolve_mut(doc, path) else {
                    return false;
                };
                match value {
                    Some(v) => {
                        node.properties.insert(property.clone(), v.clone());
                    }
                    None => {
                        node.properties.remove(property);
                    }
                }
                true
            }
            PendingDelta::ChangeComponentFunction {
                path,
                function,
                body,
            } => {
                let Some(node) = resolve_mut(doc, path) else {
                    return false;
                };
                let pos = node.functions.iter().position(|f| f.name == *function);
                match (pos, body) {
                    (Some(i), Some(b)) => node.functions[i].body = b.clone(),
                    (None, Some(b)) => node.functions.push(FunctionDef {
                        name: function.clone(),
                        body: b.clone(),
                    }),
                    (Some(i), None) => {
                        node.functions.remove(i);
                    }
                    (None, None) => return false,
                }
                true
            }
            PendingDelta::AddTemplate { template } => {
                if doc.templates.get_by_name(&template.name).is_some() {
                    return false;
                }
                doc.templates.add(template.clone()).is_ok()
            }
            PendingDelta::ScreenOrderChange { order } => {
                let mut rest = std::mem::take(&mut doc.screens);
                for name in order.iter().unique() {
                    if let Some(pos) = rest.iter().position(|s| s.name == *name) {
                        doc.screens.push(rest.remove(pos));
                    }
                }
                doc.screens.extend(rest);
                true
            }
            PendingDelta::ThemeChange { themes } => {
                doc.themes = Some(themes.clone());
                true
            }
            PendingDelta::AddConnection { id, connection } => {
                doc.connections
                    .get_or_insert_with(IndexMap::new)
                    .insert(id.clone(), connection.clone());
                true
            }
            PendingDelta::RemoveConnection { id } => doc
                .connections
                .as_mut()
                .is_some_and(|c| c.shift_remove(id).is_some()),
            PendingDelta::AddDataSource { source } => {
                let sources = &mut doc
                    .data_sources
                    .get_or_insert_with(DataSourcesManifest::default)
                    .data_sources;
                match sources.iter_mut().find(|s| s.name == source.name) {
                    Some(existing) => *existing = source.clone(),
                    None => sources.push(source.clone()),
                }
                true
            }
            PendingDelta::AddResource { resource } => {
                let resources = &mut doc
                    .resources
                    .get_or_insert_with(ResourcesManifest::default)
                    .resources;
                if resources.iter().any(|r| r.name == resource.name) {
                    return false;
                }
                resources.push(resource.clone());
                true
            }
            PendingDelta::RemoveResource { name } => {
                let Some(manifest) = doc.resources.as_mut() else {
                    return false;
                };
                let before = manifest.resources.len();
                manifest.resources.retain(|r| r.name != *name);
                manifest.resources.len() != before
            }
            PendingDelta::UpdateResource { resource } => {
                let existing = doc
                    .resources
                    .as_mut()
                    .and_then(|m| m.resources.iter_mut().find(|r| r.name == resource.name));
                match existing {
                    Some(r) => {
                        *r = resource.clone();
                        true
                    }
                    None => false,
                }
            }
            PendingDelta::DocumentPropertyChange { property, value } => {
                set_document_property(&mut doc.properties, property, value)
            }
        }
    }
}

fn add_control(
    doc: &mut AppDocument,
    parent: &ControlPath,
    control: &ControlNode,
    states: &[EditorStateEntry],
    is_component: bool,
) -> bool {
    if !parent.is_empty() && resolve_mut(doc, parent).is_none() {
        return false;
    }

    let mut taken = taken_names(doc);
    let mut renames = BTreeMap::new();
    let mut node = control.clone();
    rename_subtree(&mut node, &mut taken, &mut renames);
    if !renames.is_empty() {
        debug!(?renames, "renamed incoming controls");
    }

    let incoming: HashSet<String> = control.names().into_iter().collect();
    for entry in states.iter().filter(|e| incoming.contains(&e.name)) {
        let mut entry = rename_entry(entry.clone(), &renames);
        if entry.name == node.name {
            entry.parent_index = None;
        }
        doc.editor_states.upsert(entry);
    }

    if parent.is_empty() {
        if is_component {
            node.type_ref.is_component_definition = true;
            doc.components.push(node);
        } else {
            doc.screens.push(node);
        }
        return true;
    }
    match resolve_mut(doc, parent) {
        Some(p) => {
            p.children.push(node);
            true
        }
        None => false,
    }
}

fn remove_control(doc: &mut AppDocument, path: &ControlPath) -> bool {
    let removed = if path.next().is_empty() {
        let name = path.current();
        let from_screens = doc.screens.iter().position(|s| s.name == name);
        let from_components = doc.components.iter().position(|c| c.name == name);
        match (from_screens, from_components) {
            (Some(i), _) => Some(doc.screens.remove(i)),
            (None, Some(i)) => Some(doc.components.remove(i)),
            (None, None) => None,
        }
    } else {
        let segments = path.segments();
        let (last, parent) = match segments.split_last() {
            Some((last, parent)) => (last.clone(), ControlPath::new(parent.iter().cloned())),
            None => return false,
        };
        resolve_mut(doc, &parent).and_then(|p| p.remove_child(&last))
    };

    let Some(node) = removed else {
        return false;
    };
    for name in node.names() {
        doc.editor_states.remove(&name);
    }
    doc.entropy.control_entries.remove(&node.name);
    true
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::fixtures::sample_archive;
    use crate::ir::TypeRef;
    use crate::transforms::SourceTransformPipeline;

    fn doc() -> AppDocument {
        AppDocument::from_archive(&sample_archive(), &SourceTransformPipeline::default()).unwrap()
    }

    fn add(parent: &[&str], control: ControlNode, states: Vec<EditorStateEntry>) -> PendingDelta {
        PendingDelta::AddControl {
            parent: ControlPath::new(parent.iter().copied()),
            control,
            editor_states: states,
            is_component: false,
        }
    }

    #[test]
    fn add_picks_the_next_free_suffix() {
        let mut d = doc();
        d.editor_states.upsert(EditorStateEntry::new("Foo"));
        d.editor_states.upsert(EditorStateEntry::new("Foo_1"));

        let mut state = EditorStateEntry::new("Foo");
        state.style_name = "defaultLabelStyle".into();
        let delta = add(&["Screen1"], ControlNode::new("Foo", TypeRef::new("label")), vec![state]);
        assert!(delta.apply(&mut d));

        let screen = d.screen("Screen1").unwrap();
        assert_eq!(screen.child_names(), vec!["Button1", "Group1", "Foo_2"]);
        let copied = d.editor_states.get("Foo_2").unwrap();
        assert_eq!(copied.name, "Foo_2");
        assert_eq!(copied.style_name, "defaultLabelStyle");
        assert_eq!(d.editor_states.get("Foo").unwrap().style_name, "");
    }

    #[test]
    fn add_renames_group_members_consistently() {
        let mut d = doc();
        let group = ControlNode::new("Group1", TypeRef::new("group"))
            .with_child(ControlNode::new("Label1", TypeRef::new("label")))
            .with_child(ControlNode::new("Extra", TypeRef::new("label")));
        let mut key = EditorStateEntry::new("Group1");
        key.grouped_controls_key = Some(vec!["Label1".into(), "Extra".into()]);

        assert!(add(&["Screen1"], group, vec![key]).apply(&mut d));

        let added = d.screen("Screen1").unwrap().child("Group1_1").unwrap();
        assert_eq!(added.child_names(), vec!["Label1_1", "Extra"]);
        assert_eq!(
            d.editor_states.get("Group1_1").unwrap().grouped_controls_key,
            Some(vec!["Label1_1".to_string(), "Extra".to_string()])
        );
        d.validate().unwrap();
    }

    #[test]
    fn add_under_a_missing_parent_is_a_no_op() {
        let mut d = doc();
        let before = d.clone();
        let delta = add(&["Screen9"], ControlNode::new("X", TypeRef::new("label")), vec![]);
        assert!(!delta.apply(&mut d));
        assert_eq!(d, before);
    }

    #[test]
    fn remove_drops_the_subtree_and_its_state() {
        let mut d = doc();
        let delta = PendingDelta::RemoveControl {
            path: ControlPath::new(["Screen1", "Group1"]),
        };
        assert!(delta.apply(&mut d));
        assert_eq!(d.screen("Screen1").unwrap().child_names(), vec!["Button1"]);
        assert!(!d.editor_states.contains("Label1"));
        assert!(!d.editor_states.contains("Group1"));

        // Already gone on this side.
        assert!(!delta.apply(&mut d));
    }

    #[test]
    fn change_property_and_function() {
        let mut d = doc();
        let path = ControlPath::new(["Screen1", "Button1"]);
        assert!(PendingDelta::ChangeProperty {
            path: path.clone(),
            property: "OnSelect".into(),
            value: Some(Property::formula("Back()")),
        }
        .apply(&mut d));
        assert!(PendingDelta::ChangeComponentFunction {
            path: path.clone(),
            function: "Reset".into(),
            body: Some("Set(x, 0)".into()),
        }
        .apply(&mut d));

        let button = d.screen("Screen1").unwrap().child("Button1").unwrap();
        assert_eq!(button.properties["OnSelect"].expression, "Back()");
        assert_eq!(button.functions[0].body, "Set(x, 0)");

        assert!(!PendingDelta::ChangeProperty {
            path: ControlPath::new(["Screen1", "Gone"]),
            property: "X".into(),
            value: None,
        }
        .apply(&mut d));
    }

    #[test]
    fn screen_order_keeps_unlisted_screens() {
        let mut d = doc();
        d.screens.push(ControlNode::new("Screen2", TypeRef::new("screen")));
        d.screens.push(ControlNode::new("Screen3", TypeRef::new("screen")));
        PendingDelta::ScreenOrderChange {
            order: vec!["Screen3".into(), "Nope".into(), "Screen3".into(), "Screen1".into()],
        }
        .apply(&mut d);
        assert_eq!(d.screen_order(), vec!["Screen3", "Screen1", "Screen2"]);
    }

    #[test]
    fn document_properties_go_through_the_setter_table() {
        let mut d = doc();
        let set = |d: &mut AppDocument, p: &str, v: Value| {
            PendingDelta::DocumentPropertyChange {
                property: p.into(),
                value: v,
            }
            .apply(d)
        };
        assert!(set(&mut d, "DocumentLayoutWidth", json!(640)));
        assert!(set(&mut d, "Author", json!("me")));
        assert!(!set(&mut d, "DocumentLayoutHeight", json!("tall")));
        assert!(set(&mut d, "ShowStatusBar", json!(true)));

        assert_eq!(d.properties.document_layout_width, Some(640));
        assert_eq!(d.properties.author.as_deref(), Some("me"));
        assert_eq!(d.properties.document_layout_height, None);
        assert_eq!(d.properties.extra["ShowStatusBar"], json!(true));
    }

    #[test]
    fn connections_and_resources() {
        let mut d = doc();
        assert!(PendingDelta::AddConnection {
            id: "c1".into(),
            connection: json!({ "Name": "sql" }),
        }
        .apply(&mut d));
        assert!(PendingDelta::RemoveConnection { id: "c1".into() }.apply(&mut d));
        assert!(!PendingDelta::RemoveConnection { id: "c1".into() }.apply(&mut d));

        let logo = ResourceJson {
            name: "logo".into(),
            extra: serde_json::Map::new(),
        };
        assert!(!PendingDelta::UpdateResource { resource: logo.clone() }.apply(&mut d));
        assert!(PendingDelta::AddResource { resource: logo.clone() }.apply(&mut d));
        assert!(!PendingDelta::AddResource { resource: logo }.apply(&mut d));
        assert!(PendingDelta::RemoveResource { name: "logo".into() }.apply(&mut d));
        assert!(d.resources.unwrap().resources.is_empty());
    }

    #[test]
    fn add_template_skips_known_names() {
        let mut d = doc();
        let delta = PendingDelta::AddTemplate {
            template: TemplateRecord::new("label", "other"),
        };
        assert!(!delta.apply(&mut d));
        let delta = PendingDelta::AddTemplate {
            template: TemplateRecord::new("slider", "http://microsoft.com/appmagic/slider"),
        };
        assert!(delta.apply(&mut d));
        assert!(d.templates.get_by_name("slider").is_some());
    }
}
