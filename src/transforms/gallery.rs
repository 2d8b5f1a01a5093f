//! Galleries carry one anonymous row-template child in the archive.
//!
//! On read the child is folded into the gallery: every row-template property
//! the gallery itself does not define moves up to the gallery. Anything that
//! would collide stays on the child, which is then kept as the gallery's
//! first child. The child's name is remembered in the gallery's editor state.
//!
//! On write the child is found or rebuilt under that name, the row-template
//! properties move back down, its defaults are filled in, and it is put back
//! in front of the other children.

use std::collections::BTreeSet;

use tracing::debug;

use super::default_values::DefaultValuesTransform;
use super::{ControlTransform, TransformContext};
use crate::error::Result;
use crate::ir::{ControlNode, EditorStateEntry, TypeRef};

pub const GALLERY_TEMPLATE: &str = "gallery";
pub const ROW_TEMPLATE: &str = "galleryTemplate";

pub struct GalleryTemplateTransform;

/// Property names a template declares.
fn template_properties(ctx: &TransformContext<'_>, template: &str) -> BTreeSet<String> {
    ctx.templates
        .get_by_name(template)
        .map(|t| t.default_values.keys().cloned().collect())
        .unwrap_or_default()
}

/// Row-template properties that live on the gallery in source form.
fn promotable(ctx: &TransformContext<'_>, gallery: &ControlNode) -> BTreeSet<String> {
    let own = template_properties(ctx, gallery.template());
    template_properties(ctx, ROW_TEMPLATE)
        .into_iter()
        .filter(|p| !own.contains(p))
        .collect()
}

impl ControlTransform for GalleryTemplateTransform {
    fn name(&self) -> &'static str {
        "gallery-template"
    }

    fn applies_to(&self, node: &ControlNode, _ctx: &TransformContext<'_>) -> bool {
        node.template() == GALLERY_TEMPLATE
    }

    fn after_read(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        let hint = ctx
            .editor_states
            .get(&node.name)
            .and_then(|e| e.gallery_template_child_name.clone());
        let pos = node.children.iter().position(|c| {
            c.template() == ROW_TEMPLATE && hint.as_ref().is_none_or(|h| *h == c.name)
        });
        let Some(pos) = pos else {
            debug!(gallery = %node.name, "gallery without a row template");
            return Ok(());
        };

        let mut row = node.children.remove(pos);
        let promotable = promotable(ctx, node);
        let moving: Vec<String> = row
            .properties
            .keys()
            .filter(|k| promotable.contains(*k) && !node.properties.contains_key(*k))
            .cloned()
            .collect();
        for key in moving {
            if let Some(p) = row.properties.remove(&key) {
                node.properties.insert(key, p);
            }
        }

        match ctx.editor_states.get_mut(&node.name) {
            Some(e) => e.gallery_template_child_name = Some(row.name.clone()),
            None => ctx.editor_states.upsert(EditorStateEntry {
                gallery_template_child_name: Some(row.name.clone()),
                ..EditorStateEntry::new(node.name.clone())
            }),
        }

        if !row.properties.is_empty() || !row.children.is_empty() {
            node.children.insert(0, row);
        }
        Ok(())
    }

    fn before_write(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        let hint = ctx
            .editor_states
            .get(&node.name)
            .and_then(|e| e.gallery_template_child_name.clone());

        let existing = node.children.iter().position(|c| {
            c.template() == ROW_TEMPLATE && hint.as_ref().is_none_or(|h| *h == c.name)
        });
        let mut row = match existing {
            Some(pos) => node.children.remove(pos),
            None => {
                let name = hint.unwrap_or_else(|| ctx.editor_states.unique_name("galleryTemplate1"));
                ControlNode::new(name, TypeRef::new(ROW_TEMPLATE))
            }
        };

        let promotable = promotable(ctx, node);
        let moving: Vec<String> = node
            .properties
            .keys()
            .filter(|k| promotable.contains(*k))
            .cloned()
            .collect();
        for key in moving {
            if let Some(p) = node.properties.remove(&key) {
                row.properties.insert(key, p);
            }
        }
        DefaultValuesTransform::fill_defaults(&mut row, ctx);

        match ctx.editor_states.get_mut(&node.name) {
            Some(e) => e.gallery_template_child_name = Some(row.name.clone()),
            None => ctx.editor_states.upsert(EditorStateEntry {
                gallery_template_child_name: Some(row.name.clone()),
                ..EditorStateEntry::new(node.name.clone())
            }),
        }
        node.children.insert(0, row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRecord;
    use crate::transforms::fixtures::Stores;

    fn stores() -> Stores {
        Stores::with_templates(vec![
            TemplateRecord::new(GALLERY_TEMPLATE, "g")
                .with_default("Items", "[]")
                .with_default("Fill", "White"),
            TemplateRecord::new(ROW_TEMPLATE, "gt")
                .with_default("TemplateFill", "Transparent")
                .with_default("Fill", "Gray")
                .with_default("OnSelect", "false"),
            TemplateRecord::new("label", "l"),
        ])
    }

    fn archived_gallery() -> ControlNode {
        ControlNode::new("Gallery1", TypeRef::new(GALLERY_TEMPLATE))
            .with_formula("Items", "Accounts")
            .with_formula("Fill", "White")
            .with_child(
                ControlNode::new("galleryTemplate1", TypeRef::new(ROW_TEMPLATE))
                    .with_formula("TemplateFill", "Yellow")
                    .with_formula("Fill", "Gray")
                    .with_formula("OnSelect", "false"),
            )
            .with_child(ControlNode::new("Title1", TypeRef::new("label")))
    }

    #[test]
    fn row_template_folds_into_gallery_and_back() {
        let mut s = stores();
        let pipeline = crate::transforms::SourceTransformPipeline::default();
        let mut g = archived_gallery();

        pipeline.after_read(&mut g, &mut s.ctx()).unwrap();
        assert_eq!(g.child_names(), vec!["Title1"]);
        let props: Vec<_> = g.properties.keys().cloned().collect();
        assert_eq!(props, vec!["Items", "TemplateFill"]);
        assert_eq!(
            s.editor_states
                .get("Gallery1")
                .unwrap()
                .gallery_template_child_name
                .as_deref(),
            Some("galleryTemplate1")
        );

        pipeline.before_write(&mut g, &mut s.ctx()).unwrap();
        assert_eq!(g, archived_gallery());
    }

    #[test]
    fn colliding_row_properties_stay_on_the_child() {
        let mut s = stores();
        let mut g = archived_gallery();
        g.children[0]
            .properties
            .insert("Fill".into(), crate::ir::Property::formula("Black"));

        GalleryTemplateTransform.after_read(&mut g, &mut s.ctx()).unwrap();
        assert_eq!(g.child_names(), vec!["galleryTemplate1", "Title1"]);
        assert_eq!(g.children[0].properties["Fill"].expression, "Black");
        assert_eq!(g.properties["TemplateFill"].expression, "Yellow");

        GalleryTemplateTransform.before_write(&mut g, &mut s.ctx()).unwrap();
        assert_eq!(g.children[0].properties["Fill"].expression, "Black");
        assert_eq!(g.children[0].properties["TemplateFill"].expression, "Yellow");
        assert!(!g.properties.contains_key("TemplateFill"));
    }

    #[test]
    fn missing_row_template_is_synthesized_on_write() {
        let mut s = stores();
        let mut g = ControlNode::new("Gallery2", TypeRef::new(GALLERY_TEMPLATE))
            .with_formula("TemplateFill", "Red");
        GalleryTemplateTransform.before_write(&mut g, &mut s.ctx()).unwrap();

        let row = &g.children[0];
        assert_eq!(row.template(), ROW_TEMPLATE);
        assert_eq!(row.name, "galleryTemplate1");
        assert_eq!(row.properties["TemplateFill"].expression, "Red");
        assert_eq!(row.properties["OnSelect"].expression, "false");
    }
}
