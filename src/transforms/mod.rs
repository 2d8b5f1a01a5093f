//! Symmetric rewrites between the archive shape of a control tree and its
//! editable source shape.
//!
//! Every transform is keyed to the nodes it understands and runs bottom-up
//! (children before parents) in both directions. `before_write` undoes
//! `after_read`; on write, the transforms of one node run in reverse
//! registration order so the pair nests.
//!
//! Component definitions are renamed in a first pass over all component
//! roots, so instances anywhere in the document see the complete rename map.

pub mod component;
pub mod default_values;
pub mod gallery;
pub mod group;

use std::collections::BTreeMap;

use tracing::{instrument, trace};

use crate::error::Result;
use crate::ir::{ControlNode, EditorStateStore, Entropy};
use crate::templates::TemplateStore;
use crate::theme::{DefaultRuleHelper, Theme};

pub use app_test::AppTestTransform;
pub use component::{ComponentDefinitionTransform, ComponentInstanceTransform};
pub use default_values::DefaultValuesTransform;
pub use gallery::GalleryTemplateTransform;
pub use group::GroupControlTransform;

/// Everything a transform may read or update, borrowed for one pass.
///
/// Transforms never hold on to any of it; the driver owns the document.
pub struct TransformContext<'a> {
    pub templates: &'a mut TemplateStore,
    pub theme: Option<&'a Theme>,
    pub editor_states: &'a mut EditorStateStore,
    pub entropy: &'a mut Entropy,
    /// Component template renames seen in this pass, from → to.
    pub component_renames: BTreeMap<String, String>,
    /// Label of the file being transformed, for errors.
    pub file: String,
}

impl<'a> TransformContext<'a> {
    pub fn new(
        templates: &'a mut TemplateStore,
        theme: Option<&'a Theme>,
        editor_states: &'a mut EditorStateStore,
        entropy: &'a mut Entropy,
    ) -> Self {
        Self {
            templates,
            theme,
            editor_states,
            entropy,
            component_renames: BTreeMap::new(),
            file: String::new(),
        }
    }

    pub fn defaults(&self) -> DefaultRuleHelper<'_> {
        DefaultRuleHelper::new(self.theme, self.templates)
    }

    /// Style name recorded for a control, or its template's default style.
    pub fn style_of(&self, node: &ControlNode) -> String {
        self.editor_states
            .get(&node.name)
            .map(|e| e.style_name.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| crate::theme::default_style_name(node.template()))
    }
}

/// One format quirk, undone on read and redone on write.
pub trait ControlTransform {
    fn name(&self) -> &'static str;

    /// Whether this transform handles `node` in its current shape.
    fn applies_to(&self, node: &ControlNode, ctx: &TransformContext<'_>) -> bool;

    /// Archive shape → source shape.
    fn after_read(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()>;

    /// Source shape → archive shape.
    fn before_write(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()>;
}

pub struct SourceTransformPipeline {
    definitions: ComponentDefinitionTransform,
    transforms: Vec<Box<dyn ControlTransform>>,
}

impl Default for SourceTransformPipeline {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ComponentInstanceTransform),
            Box::new(AppTestTransform),
            Box::new(GroupControlTransform),
            Box::new(GalleryTemplateTransform),
            Box::new(DefaultValuesTransform),
        ])
    }
}

impl SourceTransformPipeline {
    pub fn new(transforms: Vec<Box<dyn ControlTransform>>) -> Self {
        Self {
            definitions: ComponentDefinitionTransform,
            transforms,
        }
    }

    /// Archive → source for a document's components and screens.
    #[instrument(skip_all)]
    pub fn after_read_document(
        &self,
        components: &mut [ControlNode],
        screens: &mut [ControlNode],
        ctx: &mut TransformContext<'_>,
    ) -> Result<()> {
        for root in components.iter_mut() {
            ctx.file = root.name.clone();
            if self.definitions.applies_to(root, ctx) {
                self.definitions.after_read(root, ctx)?;
            }
        }
        for root in components.iter_mut().chain(screens.iter_mut()) {
            ctx.file = root.name.clone();
            self.after_read(root, ctx)?;
        }
        Ok(())
    }

    /// Source → archive for a document's components and screens.
    #[instrument(skip_all)]
    pub fn before_write_document(
        &self,
        components: &mut [ControlNode],
        screens: &mut [ControlNode],
        ctx: &mut TransformContext<'_>,
    ) -> Result<()> {
        for root in components.iter_mut() {
            ctx.file = root.name.clone();
            if self.definitions.applies_to(root, ctx) {
                self.definitions.before_write(root, ctx)?;
            }
        }
        for root in components.iter_mut().chain(screens.iter_mut()) {
            ctx.file = root.name.clone();
            self.before_write(root, ctx)?;
        }
        Ok(())
    }

    /// Bottom-up `after_read` over one tree.
    pub fn after_read(&self, root: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        root.visit_post_order(&mut |node| {
            for t in &self.transforms {
                if t.applies_to(node, ctx) {
                    trace!(transform = t.name(), control = %node.name, "after_read");
                    t.after_read(node, ctx)?;
                }
            }
            Ok(())
        })
    }

    /// Bottom-up `before_write` over one tree, transforms in reverse order.
    pub fn before_write(&self, root: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        root.visit_post_order(&mut |node| {
            for t in self.transforms.iter().rev() {
                if t.applies_to(node, ctx) {
                    trace!(transform = t.name(), control = %node.name, "before_write");
                    t.before_write(node, ctx)?;
                }
            }
            Ok(())
        })
    }
}
