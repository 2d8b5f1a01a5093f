//! Shared test utilities for integration tests
//!
//! Builds a small but complete app archive on disk: a screen with a
//! button, a group of labels and a component instance, one component
//! definition, templates and a pass-through image.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use appsource::archive::{ArchiveStore, MemoryArchive};
use serde_json::{Value, json};

pub const COMPONENT_ID: &str = "a1b2c3";

const BUTTON_XML: &str = r#"<widget xmlns="http://openajax.org/metadata" name="button" version="2.1.0"><properties><property name="Fill" defaultValue="RGBA(56, 96, 178, 1)"/><property name="Text" defaultValue="&quot;Button&quot;"/></properties></widget>"#;

fn template(name: &str) -> Value {
    json!({ "Id": format!("http://microsoft.com/appmagic/{name}"), "Name": name, "Version": "1.0" })
}

fn rule(property: &str, script: &str) -> Value {
    json!({ "Property": property, "Category": "Design", "InvariantScript": script, "RuleProviderType": "Unknown" })
}

fn control(name: &str, parent: &str, template: Value, order: u32, rules: Value) -> Value {
    json!({
        "Name": name,
        "ControlUniqueId": (order + 20).to_string(),
        "Template": template,
        "VariantName": "",
        "Parent": parent,
        "PublishOrderIndex": order,
        "IsLocked": false,
        "Rules": rules,
        "Children": []
    })
}

pub fn sample_archive() -> MemoryArchive {
    let component_template = json!({ "Id": "http://microsoft.com/appmagic/Component", "Name": COMPONENT_ID, "Version": "1.0" });

    let mut group = control("Group1", "Screen1", template("group"), 2, json!([]));
    group["GroupedControlsKey"] = json!(["Label1", "Label2"]);

    let mut screen = control("Screen1", "", template("screen"), 0, json!([rule("Fill", "White")]));
    screen["Children"] = json!([
        control("Button1", "Screen1", template("button"), 0, json!([
            rule("Fill", "RGBA(56, 96, 178, 1)"),
            rule("Text", "\"Go\""),
            rule("OnSelect", "Navigate(Screen1)")
        ])),
        control("HeaderBar1", "Screen1", component_template.clone(), 1, json!([])),
        group,
        control("Label1", "Screen1", template("label"), 3, json!([rule("Text", "\"a\"")])),
        control("Label2", "Screen1", template("label"), 4, json!([rule("Text", "\"b\"")]))
    ]);

    let mut definition_template = component_template.clone();
    definition_template["IsComponentDefinition"] = json!(true);
    let mut definition = control("HeaderBar", "", definition_template, 0, json!([rule("Height", "40")]));
    definition["Children"] = json!([
        control("Title", "HeaderBar", template("label"), 0, json!([rule("Text", "\"Title\"")]))
    ]);

    let mut catalog: Vec<Value> = ["screen", "group", "label"].into_iter().map(template).collect();
    let mut button = template("button");
    button["Template"] = json!(BUTTON_XML);
    catalog.push(button);
    let mut component = component_template;
    component["IsComponentTemplate"] = json!(true);
    catalog.push(component);

    let mut a = MemoryArchive::new();
    let mut put = |path: &str, v: Value| {
        a.create_entry(path, serde_json::to_vec(&v).expect("json"))
            .expect("entry");
    };
    put("Header.json", json!({ "DocVersion": "1.346", "MinVersionToLoad": "1.331", "MSAppStructureVersion": "2.0" }));
    put("Properties.json", json!({ "Author": "", "Name": "Sample.msapp", "DocumentLayoutWidth": 1366 }));
    put("Controls/4.json", json!({ "TopParent": screen }));
    put("Components/1.json", json!({ "TopParent": definition }));
    put("References/Templates.json", json!({ "UsedTemplates": catalog }));
    a.create_entry("Assets/Images/logo.png", vec![0x89, b'P', b'N', b'G', 0, 1, 2])
        .expect("entry");
    a
}

/// Write the sample archive as a zip under `dir`.
pub fn write_sample_archive(dir: &Path) -> PathBuf {
    let path = dir.join("Sample.msapp");
    sample_archive()
        .write_zip(&path)
        .expect("write zip");
    path
}
