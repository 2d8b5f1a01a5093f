//! Themes and the default-rule lookup built on them.
//!
//! A property's default is, in order: the value the control's style gives
//! it (with `%Palette.X%` references resolved against the current theme),
//! then the value the template's XML gives it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::templates::TemplateStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteEntry {
    pub name: String,
    pub value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleProperty {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub name: String,
    pub control_template_name: String,
    #[serde(default)]
    pub property_values_map: Vec<StyleProperty>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub palette: Vec<PaletteEntry>,
    #[serde(default)]
    pub styles: Vec<Style>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `References/Themes.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThemesManifest {
    #[serde(default)]
    pub current_theme: String,
    #[serde(default)]
    pub custom_themes: Vec<Theme>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThemesManifest {
    pub fn current(&self) -> Option<&Theme> {
        self.custom_themes
            .iter()
            .find(|t| t.name == self.current_theme)
    }
}

impl Theme {
    pub fn style(&self, name: &str) -> Option<&Style> {
        self.styles.iter().find(|s| s.name == name)
    }

    /// Replace every `%Palette.Name%` with the palette value.
    pub fn resolve_palette(&self, value: &str) -> String {
        const PREFIX: &str = "%Palette.";
        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find(PREFIX) {
            out.push_str(&rest[..start]);
            let after = &rest[start + PREFIX.len()..];
            let Some(end) = after.find('%') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let key = &after[..end];
            match self.palette.iter().find(|p| p.name == key) {
                Some(p) => out.push_str(&p.value),
                None => out.push_str(&rest[start..start + PREFIX.len() + end + 1]),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Style applied to a control whose editor state names none.
pub fn default_style_name(template: &str) -> String {
    let mut chars = template.chars();
    match chars.next() {
        Some(first) => format!("default{}{}Style", first.to_uppercase(), chars.as_str()),
        None => "defaultStyle".to_string(),
    }
}

/// Computes default expressions from template, style and theme.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRuleHelper<'a> {
    theme: Option<&'a Theme>,
    templates: &'a TemplateStore,
}

impl<'a> DefaultRuleHelper<'a> {
    pub fn new(theme: Option<&'a Theme>, templates: &'a TemplateStore) -> Self {
        Self { theme, templates }
    }

    pub fn try_get_default_rule(&self, template: &str, style: &str, property: &str) -> Option<String> {
        if let Some(theme) = self.theme
            && let Some(s) = theme.style(style)
            && let Some(p) = s.property_values_map.iter().find(|p| p.property == property)
        {
            return Some(theme.resolve_palette(&p.value));
        }

        self.templates
            .get_by_name(template)
            .and_then(|t| t.default_values.get(property))
            .cloned()
    }

    /// Every default for a template/style pair, style values winning.
    pub fn default_rules(&self, template: &str, style: &str) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = self
            .templates
            .get_by_name(template)
            .map(|t| t.default_values.clone())
            .unwrap_or_default();

        if let Some(theme) = self.theme
            && let Some(s) = theme.style(style)
        {
            for p in &s.property_values_map {
                out.insert(p.property.clone(), theme.resolve_palette(&p.value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRecord;

    fn theme() -> Theme {
        serde_json::from_value(serde_json::json!({
            "name": "v9",
            "palette": [ { "name": "Primary", "value": "RGBA(0, 18, 107, 1)", "type": "c" } ],
            "styles": [ {
                "name": "defaultButtonStyle",
                "controlTemplateName": "button",
                "propertyValuesMap": [ { "property": "Fill", "value": "%Palette.Primary%" } ]
            } ]
        }))
        .unwrap()
    }

    fn templates() -> TemplateStore {
        let mut store = TemplateStore::new();
        store
            .add(
                TemplateRecord::new("button", "b")
                    .with_default("Fill", "Blue")
                    .with_default("Text", "\"Button\""),
            )
            .unwrap();
        store
    }

    #[test]
    fn style_beats_template() {
        let t = theme();
        let store = templates();
        let helper = DefaultRuleHelper::new(Some(&t), &store);
        assert_eq!(
            helper.try_get_default_rule("button", "defaultButtonStyle", "Fill").as_deref(),
            Some("RGBA(0, 18, 107, 1)")
        );
        assert_eq!(
            helper.try_get_default_rule("button", "defaultButtonStyle", "Text").as_deref(),
            Some("\"Button\"")
        );
        assert_eq!(helper.try_get_default_rule("button", "other", "Fill").as_deref(), Some("Blue"));
        assert_eq!(helper.try_get_default_rule("label", "x", "Fill"), None);
    }

    #[test]
    fn unknown_palette_keys_are_kept() {
        let t = theme();
        assert_eq!(t.resolve_palette("%Palette.Nope% + 1"), "%Palette.Nope% + 1");
        assert_eq!(t.resolve_palette("50%"), "50%");
        assert_eq!(t.resolve_palette("a %Palette.Primary% b"), "a RGBA(0, 18, 107, 1) b");
    }

    #[test]
    fn default_style_names() {
        assert_eq!(default_style_name("button"), "defaultButtonStyle");
        assert_eq!(default_style_name(""), "defaultStyle");
    }
}
