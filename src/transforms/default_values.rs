//! Keep source files minimal: properties equal to their default are dropped
//! on read and put back on write.
//!
//! Defaults always reflect the control's *current* style, so changing a
//! style in source changes which defaults come back on write.

use super::{ControlTransform, TransformContext};
use crate::error::Result;
use crate::ir::{ControlNode, Property};

pub struct DefaultValuesTransform;

impl DefaultValuesTransform {
    /// Add every default of `node` that it does not already set.
    pub fn fill_defaults(node: &mut ControlNode, ctx: &TransformContext<'_>) {
        let style = ctx.style_of(node);
        for (name, value) in ctx.defaults().default_rules(node.template(), &style) {
            node.properties
                .entry(name)
                .or_insert_with(|| Property::formula(value));
        }
    }

    /// Drop every formula of `node` that equals its default.
    pub fn strip_defaults(node: &mut ControlNode, ctx: &TransformContext<'_>) {
        let style = ctx.style_of(node);
        let defaults = ctx.defaults().default_rules(node.template(), &style);
        node.properties
            .retain(|name, p| !(p.is_formula && defaults.get(name) == Some(&p.expression)));
    }
}

impl ControlTransform for DefaultValuesTransform {
    fn name(&self) -> &'static str {
        "default-values"
    }

    fn applies_to(&self, node: &ControlNode, ctx: &TransformContext<'_>) -> bool {
        ctx.templates.get_by_name(node.template()).is_some()
    }

    fn after_read(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        Self::strip_defaults(node, ctx);
        Ok(())
    }

    fn before_write(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        Self::fill_defaults(node, ctx);
        Ok(())
    }
}
