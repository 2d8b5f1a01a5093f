//! Group controls.
//!
//! In the archive a group is an empty control whose editor state lists the
//! names of the siblings it owns. In source those siblings are nested under
//! the group. Sibling order is restored on write from each control's
//! recorded publish index.

use tracing::warn;

use super::{ControlTransform, TransformContext};
use crate::error::{Result, SourceError};
use crate::ir::{ControlNode, EditorStateEntry};

pub const GROUP_TEMPLATE: &str = "group";

pub struct GroupControlTransform;

fn group_names(parent: &ControlNode) -> Vec<String> {
    parent
        .children
        .iter()
        .filter(|c| c.template() == GROUP_TEMPLATE)
        .map(|c| c.name.clone())
        .collect()
}

impl ControlTransform for GroupControlTransform {
    fn name(&self) -> &'static str {
        "group-control"
    }

    fn applies_to(&self, node: &ControlNode, _ctx: &TransformContext<'_>) -> bool {
        node.children.iter().any(|c| c.template() == GROUP_TEMPLATE)
    }

    fn after_read(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        for group in group_names(node) {
            let members = ctx
                .editor_states
                .get(&group)
                .and_then(|e| e.grouped_controls_key.clone())
                .ok_or_else(|| {
                    SourceError::structural(
                        &ctx.file,
                        format!("group '{group}' has no grouped-controls key in its editor state"),
                    )
                })?;

            let mut owned = Vec::with_capacity(members.len());
            for member in &members {
                match node.remove_child(member) {
                    Some(child) => owned.push(child),
                    None => warn!(group = %group, member = %member, "grouped control not found among siblings"),
                }
            }
            if let Some(g) = node.child_mut(&group) {
                g.children.extend(owned);
            }
            if let Some(e) = ctx.editor_states.get_mut(&group) {
                e.grouped_controls_key = None;
            }
        }
        Ok(())
    }

    fn before_write(&self, node: &mut ControlNode, ctx: &mut TransformContext<'_>) -> Result<()> {
        let mut released = Vec::new();
        for group in node
            .children
            .iter_mut()
            .filter(|c| c.template() == GROUP_TEMPLATE)
        {
            let members = std::mem::take(&mut group.children);
            let key: Vec<String> = members.iter().map(|m| m.name.clone()).collect();

            match ctx.editor_states.get_mut(&group.name) {
                Some(e) => e.grouped_controls_key = Some(key),
                None => {
                    // Group authored in source: members without a recorded
                    // position go after everything that has one.
                    for m in &members {
                        let entry = ctx
                            .editor_states
                            .get(&m.name)
                            .cloned()
                            .unwrap_or_else(|| EditorStateEntry::new(m.name.clone()));
                        if entry.parent_index.is_none() {
                            ctx.editor_states.upsert(EditorStateEntry {
                                parent_index: Some(u32::MAX),
                                ..entry
                            });
                        }
                    }
                    ctx.editor_states.upsert(EditorStateEntry {
                        grouped_controls_key: Some(key),
                        ..EditorStateEntry::new(group.name.clone())
                    });
                }
            }
            released.extend(members);
        }

        node.children.extend(released);
        let states = &*ctx.editor_states;
        node.children.sort_by_key(|c| {
            states
                .get(&c.name)
                .and_then(|e| e.parent_index)
                .unwrap_or(u32::MAX)
        });
        Ok(())
    }
}
