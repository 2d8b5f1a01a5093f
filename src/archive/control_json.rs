//! The control JSON stored in `Controls/*.json` and `Components/*.json`,
//! and its split into a [`ControlNode`] tree plus editor state.
//!
//! Everything the tree does not model (rule metadata, lock flag, unknown
//! fields) goes to the control's [`EditorStateEntry`], so the JSON can be
//! rebuilt from the two halves.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SourceError};
use crate::ir::{ControlNode, EditorStateEntry, EditorStateStore, FunctionDef, Property, RuleState, TypeRef};
use crate::templates::TemplateStore;
use crate::text::quote_string_literal;

/// Editor-state key for template fields the catalog cannot reproduce.
const TEMPLATE_STASH: &str = "Template";

/// Top-level shape of a control file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFile {
    #[serde(rename = "TopParent")]
    pub top_parent: ControlJson,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateJson {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_component_definition: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleJson {
    pub property: String,
    #[serde(default)]
    pub category: String,
    pub invariant_script: String,
    #[serde(default)]
    pub rule_provider_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionJson {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlJson {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_unique_id: Option<String>,
    pub template: TemplateJson,
    #[serde(default)]
    pub variant_name: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<f64>,
    #[serde(default)]
    pub publish_order_index: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub style_name: String,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_controls_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery_template_child_name: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionJson>,
    #[serde(default)]
    pub children: Vec<ControlJson>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Split archive JSON into a tree, filing editor state as it goes.
///
/// Children are put in publish order; the index each had is kept in its
/// editor state so it can be written back unchanged.
pub fn control_from_json(
    json: ControlJson,
    file: &str,
    templates: &TemplateStore,
    states: &mut EditorStateStore,
) -> Result<ControlNode> {
    let ControlJson {
        name,
        control_unique_id,
        template,
        variant_name,
        parent: _,
        index,
        publish_order_index,
        style_name,
        is_locked,
        grouped_controls_key,
        gallery_template_child_name,
        rules,
        functions,
        mut children,
        mut extra,
    } = json;

    let type_ref = TypeRef {
        template: template.name.clone(),
        variant: (!variant_name.is_empty()).then_some(variant_name),
        is_component_definition: template.is_component_definition == Some(true),
    };
    if let Some(stash) = template_stash(&template, templates) {
        extra.insert(TEMPLATE_STASH.to_string(), stash);
    }

    let mut node = ControlNode::new(name.clone(), type_ref);
    let mut entry = EditorStateEntry {
        unique_id: control_unique_id,
        is_locked,
        style_name,
        parent_index: Some(publish_order_index),
        z_index: index,
        grouped_controls_key,
        gallery_template_child_name,
        extension_data: extra,
        ..EditorStateEntry::new(name)
    };

    for rule in rules {
        if node.properties.contains_key(&rule.property) {
            return Err(SourceError::structural(
                file,
                format!("rule '{}' repeated on '{}'", rule.property, node.name),
            ));
        }
        node.properties
            .insert(rule.property.clone(), Property::formula(rule.invariant_script));
        entry.rules.insert(
            rule.property,
            RuleState {
                category: rule.category,
                rule_provider_type: rule.rule_provider_type,
                extra: rule.extra,
            },
        );
    }
    node.functions = functions
        .into_iter()
        .map(|f| FunctionDef {
            name: f.name,
            body: f.body,
        })
        .collect();
    states.insert(entry)?;

    children.sort_by_key(|c| c.publish_order_index);
    for child in children {
        node.children
            .push(control_from_json(child, file, templates, states)?);
    }
    Ok(node)
}

/// Template fields to keep when the catalog entry would not reproduce them.
fn template_stash(template: &TemplateJson, templates: &TemplateStore) -> Option<Value> {
    let catalog = templates.get_by_name(&template.name);
    let matches_catalog = catalog.is_some_and(|t| t.id == template.id && t.version == template.version);
    if matches_catalog && template.extra.is_empty() && template.is_component_definition != Some(false) {
        return None;
    }

    let mut stash = Map::new();
    stash.insert("Id".into(), Value::from(template.id.clone()));
    stash.insert("Version".into(), Value::from(template.version.clone()));
    if template.is_component_definition == Some(false) {
        stash.insert("IsComponentDefinition".into(), Value::Bool(false));
    }
    stash.extend(template.extra.clone());
    Some(Value::Object(stash))
}

/// Rebuild archive JSON for `node`, a child at `position` under `parent`.
pub fn control_to_json(
    node: &ControlNode,
    parent: &str,
    position: usize,
    file: &str,
    templates: &TemplateStore,
    states: &EditorStateStore,
) -> Result<ControlJson> {
    let entry = states
        .get(&node.name)
        .cloned()
        .unwrap_or_else(|| EditorStateEntry::new(node.name.clone()));
    let mut extra = entry.extension_data;
    let template = template_json(node, extra.remove(TEMPLATE_STASH), file, templates)?;

    let mut rules = Vec::with_capacity(node.properties.len());
    let ordered = entry
        .rules
        .keys()
        .filter(|k| node.properties.contains_key(*k))
        .chain(node.properties.keys().filter(|k| !entry.rules.contains_key(*k)));
    for name in ordered {
        let Some(prop) = node.properties.get(name) else {
            continue;
        };
        let state = entry.rules.get(name).cloned().unwrap_or_default();
        let invariant_script = if prop.is_formula {
            prop.expression.clone()
        } else {
            quote_string_literal(&prop.expression)
        };
        rules.push(RuleJson {
            property: name.clone(),
            category: state.category,
            invariant_script,
            rule_provider_type: state.rule_provider_type,
            extra: state.extra,
        });
    }

    let children = node
        .children
        .iter()
        .enumerate()
        .map(|(i, c)| control_to_json(c, &node.name, i, file, templates, states))
        .collect::<Result<Vec<_>>>()?;

    let publish_order_index = entry
        .parent_index
        .filter(|i| *i != u32::MAX)
        .unwrap_or(position as u32);

    Ok(ControlJson {
        name: node.name.clone(),
        control_unique_id: entry.unique_id,
        template,
        variant_name: node.type_ref.variant.clone().unwrap_or_default(),
        parent: parent.to_string(),
        index: entry.z_index,
        publish_order_index,
        style_name: entry.style_name,
        is_locked: entry.is_locked,
        grouped_controls_key: entry.grouped_controls_key,
        gallery_template_child_name: entry.gallery_template_child_name,
        rules,
        functions: node
            .functions
            .iter()
            .map(|f| FunctionJson {
                name: f.name.clone(),
                body: f.body.clone(),
            })
            .collect(),
        children,
        extra,
    })
}

fn template_json(
    node: &ControlNode,
    stash: Option<Value>,
    file: &str,
    templates: &TemplateStore,
) -> Result<TemplateJson> {
    let mut out = TemplateJson {
        name: node.template().to_string(),
        is_component_definition: node.type_ref.is_component_definition.then_some(true),
        ..TemplateJson::default()
    };

    match stash {
        Some(Value::Object(mut stash)) => {
            let mut take_str = |key: &str| match stash.remove(key) {
                Some(Value::String(s)) => s,
                _ => String::new(),
            };
            out.id = take_str("Id");
            out.version = take_str("Version");
            if stash.remove("IsComponentDefinition") == Some(Value::Bool(false)) {
                out.is_component_definition = Some(false);
            }
            out.extra = stash;
        }
        _ => {
            let record = templates.get_by_name(node.template()).ok_or_else(|| {
                SourceError::structural(
                    file,
                    format!("'{}' uses template '{}', which is not in the catalog", node.name, node.template()),
                )
            })?;
            out.id = record.id.clone();
            out.version = record.version.clone();
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRecord;

    fn catalog() -> TemplateStore {
        let mut t = TemplateStore::new();
        for (name, id) in [
            ("screen", "http://microsoft.com/appmagic/screen"),
            ("label", "http://microsoft.com/appmagic/label"),
        ] {
            t.add(TemplateRecord {
                version: "2.1.0".into(),
                ..TemplateRecord::new(name, id)
            })
            .unwrap();
        }
        t
    }

    fn screen_json() -> Value {
        serde_json::json!({
            "TopParent": {
                "Type": "ControlInfo",
                "Name": "Screen1",
                "ControlUniqueId": "1",
                "Template": { "Id": "http://microsoft.com/appmagic/screen", "Name": "screen", "Version": "2.1.0" },
                "VariantName": "",
                "Parent": "",
                "Index": 0.0,
                "PublishOrderIndex": 0,
                "IsLocked": false,
                "Rules": [
                    { "Property": "OnVisible", "Category": "Behavior", "InvariantScript": "Set(x, 1)", "RuleProviderType": "Unknown" },
                    { "Property": "Fill", "Category": "Design", "InvariantScript": "White", "RuleProviderType": "Unknown" }
                ],
                "Children": [
                    {
                        "Name": "Second", "ControlUniqueId": "3", "Parent": "Screen1",
                        "Template": { "Id": "x", "Name": "label", "Version": "9.9", "LastModifiedTimestamp": "0" },
                        "VariantName": "", "PublishOrderIndex": 2, "IsLocked": true, "Rules": [], "Children": []
                    },
                    {
                        "Name": "First", "ControlUniqueId": "2", "Parent": "Screen1",
                        "Template": { "Id": "http://microsoft.com/appmagic/label", "Name": "label", "Version": "2.1.0" },
                        "VariantName": "big", "PublishOrderIndex": 1, "IsLocked": false,
                        "StyleName": "defaultLabelStyle",
                        "Rules": [ { "Property": "Text", "Category": "Data", "InvariantScript": "\"hi\"", "RuleProviderType": "User" } ],
                        "Children": []
                    }
                ]
            }
        })
    }

    fn load(states: &mut EditorStateStore) -> ControlNode {
        let file: ControlFile = serde_json::from_value(screen_json()).unwrap();
        control_from_json(file.top_parent, "Controls/1.json", &catalog(), states).unwrap()
    }

    #[test]
    fn splits_tree_from_editor_state() {
        let mut states = EditorStateStore::new();
        let node = load(&mut states);

        assert_eq!(node.child_names(), vec!["First", "Second"]);
        assert_eq!(node.children[0].type_ref.variant.as_deref(), Some("big"));
        assert_eq!(node.properties["Fill"], Property::formula("White"));

        let screen = states.get("Screen1").unwrap();
        assert_eq!(screen.rules.keys().collect::<Vec<_>>(), vec!["OnVisible", "Fill"]);
        assert_eq!(screen.extension_data["Type"], Value::from("ControlInfo"));
        assert!(!screen.extension_data.contains_key(TEMPLATE_STASH));

        let second = states.get("Second").unwrap();
        assert!(second.is_locked);
        assert_eq!(second.parent_index, Some(2));
        assert_eq!(second.extension_data[TEMPLATE_STASH]["Version"], Value::from("9.9"));
    }

    #[test]
    fn rebuilds_equivalent_json() {
        let mut states = EditorStateStore::new();
        let node = load(&mut states);
        let json = control_to_json(&node, "", 0, "Controls/1.json", &catalog(), &states).unwrap();
        let back = serde_json::to_value(ControlFile { top_parent: json }).unwrap();

        let mut expected = screen_json();
        // Children come back in publish order.
        let children = expected["TopParent"]["Children"].as_array_mut().unwrap();
        children.swap(0, 1);
        assert_eq!(back, expected);
    }

    #[test]
    fn literals_become_string_rules() {
        let mut node = ControlNode::new("L", TypeRef::new("label"));
        node.properties
            .insert("Text".into(), Property::literal("say \"hi\""));
        let json = control_to_json(&node, "S", 4, "f", &catalog(), &EditorStateStore::new()).unwrap();
        assert_eq!(json.rules[0].invariant_script, "\"say \"\"hi\"\"\"");
        assert_eq!(json.rules[0].category, "Design");
        assert_eq!(json.publish_order_index, 4);
        assert_eq!(json.parent, "S");
    }

    #[test]
    fn unknown_template_without_stash_is_rejected() {
        let node = ControlNode::new("X", TypeRef::new("mystery"));
        let err = control_to_json(&node, "", 0, "f", &catalog(), &EditorStateStore::new()).unwrap_err();
        assert!(matches!(err, SourceError::StructuralValidation { .. }));
    }
}
