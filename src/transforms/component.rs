//! Component definitions and their instances.
//!
//! An archive names a component's template with a generated id; source
//! names it after the component itself. The definition transform renames
//! the template (recording the generated id in [`crate::ir::Entropy`]) and
//! the instance transform follows every reference to it.

use tracing::debug;

use super::{ControlTransform, TransformContext};
use crate::error::{Result, SourceError};
use crate::ir::ControlNode;

pub struct ComponentDefinitionTransform;

impl ControlTransform for ComponentDefinitionTransform {
    fn name(&self) -> &'static str {
        "component-definition"
    }

    fn applies_to(&self, node: &ControlNode, _ctx: &TransformContext<'_>) -> bool {
        node.type_ref.is_component_definition
    }

    fn after_read(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        let archived = node.template().to_string();
        let source = node.name.clone();
        rename_template(ctx, &archived, &source)?;
        ctx.entropy.record_component_id(&source, &archived);
        node.type_ref.template = source;
        Ok(())
    }

    fn before_write(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        let current = node.template().to_string();
        let archived = ctx
            .entropy
            .component_id(&node.name)
            .map(str::to_string)
            .unwrap_or_else(|| current.clone());
        rename_template(ctx, &current, &archived)?;
        node.type_ref.template = archived;
        Ok(())
    }
}

fn rename_template(ctx: &mut TransformContext<'_>, from: &str, to: &str) -> Result<()> {
    if ctx.templates.get_by_name(from).is_none() {
        return Err(SourceError::structural(
            &ctx.file,
            format!("component template '{from}' is not in the template catalog"),
        ));
    }
    if !ctx.templates.try_rename(from, to) {
        return Err(SourceError::structural(
            &ctx.file,
            format!("cannot rename component template '{from}' to '{to}': name taken"),
        ));
    }
    debug!(from, to, "component template renamed");
    ctx.component_renames
        .insert(from.to_string(), to.to_string());
    Ok(())
}

pub struct ComponentInstanceTransform;

impl ComponentInstanceTransform {
    fn follow(node: &mut ControlNode, ctx: &TransformContext<'_>) -> Result<()> {
        match ctx.component_renames.get(node.template()) {
            Some(to) => {
                node.type_ref.template = to.clone();
                Ok(())
            }
            None => Err(SourceError::structural(
                &ctx.file,
                format!(
                    "'{}' is an instance of component '{}', which has no definition",
                    node.name,
                    node.template()
                ),
            )),
        }
    }
}

impl ControlTransform for ComponentInstanceTransform {
    fn name(&self) -> &'static str {
        "component-instance"
    }

    fn applies_to(&self, node: &ControlNode, ctx: &TransformContext<'_>) -> bool {
        if node.type_ref.is_component_definition {
            return false;
        }
        ctx.component_renames.contains_key(node.template())
            || ctx
                .templates
                .get_by_name(node.template())
                .is_some_and(|t| t.is_component_template)
    }

    fn after_read(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        Self::follow(node, ctx)
    }

    fn before_write(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        Self::follow(node, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TypeRef;
    use crate::templates::TemplateRecord;
    use crate::transforms::SourceTransformPipeline;
    use crate::transforms::fixtures::Stores;

    fn component_template(name: &str) -> TemplateRecord {
        TemplateRecord {
            is_component_template: true,
            ..TemplateRecord::new(name, "http://microsoft.com/appmagic/Component")
        }
    }

    fn definition() -> ControlNode {
        ControlNode::new(
            "HeaderBar",
            TypeRef {
                is_component_definition: true,
                ..TypeRef::new("a1b2c3")
            },
        )
    }

    fn screen_using(template: &str) -> ControlNode {
        ControlNode::new("Screen1", TypeRef::new("screen"))
            .with_child(ControlNode::new("HeaderBar1", TypeRef::new(template)))
    }

    #[test]
    fn definition_and_instances_are_renamed_and_restored() {
        let mut s = Stores::with_templates(vec![component_template("a1b2c3")]);
        let pipeline = SourceTransformPipeline::default();
        let mut components = vec![definition()];
        let mut screens = vec![screen_using("a1b2c3")];

        pipeline
            .after_read_document(&mut components, &mut screens, &mut s.ctx())
            .unwrap();
        assert_eq!(components[0].template(), "HeaderBar");
        assert_eq!(screens[0].children[0].template(), "HeaderBar");
        assert!(s.templates.get_by_name("HeaderBar").is_some());
        assert_eq!(s.entropy.component_id("HeaderBar"), Some("a1b2c3"));

        pipeline
            .before_write_document(&mut components, &mut screens, &mut s.ctx())
            .unwrap();
        assert_eq!(components[0], definition());
        assert_eq!(screens[0], screen_using("a1b2c3"));
        assert!(s.templates.get_by_name("a1b2c3").is_some());
    }

    #[test]
    fn instance_of_unknown_component_is_rejected() {
        let mut s = Stores::with_templates(vec![component_template("orphan")]);
        let mut screens = vec![screen_using("orphan")];

        let err = SourceTransformPipeline::default()
            .after_read_document(&mut [], &mut screens, &mut s.ctx())
            .unwrap_err();
        assert!(matches!(err, SourceError::StructuralValidation { .. }));
    }

    #[test]
    fn definition_without_template_is_rejected() {
        let mut s = Stores::default();
        let mut node = definition();
        assert!(
            ComponentDefinitionTransform
                .after_read(&mut node, &mut s.ctx())
                .is_err()
        );
    }

    #[test]
    fn component_authored_in_source_keeps_its_name() {
        let mut s = Stores::with_templates(vec![component_template("Card")]);
        let mut node = ControlNode::new(
            "Card",
            TypeRef {
                is_component_definition: true,
                ..TypeRef::new("Card")
            },
        );
        let mut ctx = s.ctx();
        ComponentDefinitionTransform.before_write(&mut node, &mut ctx).unwrap();
        assert_eq!(node.template(), "Card");
        assert_eq!(ctx.component_renames.get("Card").map(String::as_str), Some("Card"));
    }
}
