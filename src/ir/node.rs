//! The control tree every transform, reader and writer works on.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{Result, SourceError};

/// Template reference of a control: `button`, `button.primary`, or a
/// component name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRef {
    pub template: String,
    pub variant: Option<String>,
    /// Set on the root of a component definition, not on its instances.
    pub is_component_definition: bool,
}

impl TypeRef {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{}.{v}", self.template),
            None => f.write_str(&self.template),
        }
    }
}

/// A property value. Formulas are opaque expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub expression: String,
    pub is_formula: bool,
}

impl Property {
    pub fn formula(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            is_formula: true,
        }
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            expression: text.into(),
            is_formula: false,
        }
    }
}

/// Named handler body on a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub body: String,
}

/// Where a node came from. Diagnostics only, ignored by equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSpan {
    pub file: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start_line, self.start_column)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControlNode {
    pub name: String,
    pub type_ref: TypeRef,
    /// Ordered by property name.
    pub properties: BTreeMap<String, Property>,
    pub functions: Vec<FunctionDef>,
    /// Publish order.
    pub children: Vec<ControlNode>,
    pub span: Option<SourceSpan>,
}

impl PartialEq for ControlNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.type_ref == other.type_ref
            && self.properties == other.properties
            && self.functions == other.functions
            && self.children == other.children
    }
}

impl Eq for ControlNode {}

impl ControlNode {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            ..Self::default()
        }
    }

    pub fn template(&self) -> &str {
        &self.type_ref.template
    }

    pub fn with_formula(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.properties
            .insert(name.into(), Property::formula(expression));
        self
    }

    pub fn with_child(mut self, child: ControlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.functions.push(FunctionDef {
            name: name.into(),
            body: body.into(),
        });
        self
    }

    pub fn child(&self, name: &str) -> Option<&ControlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut ControlNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Detach a direct child by name.
    pub fn remove_child(&mut self, name: &str) -> Option<ControlNode> {
        let pos = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(pos))
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }

    /// Depth-first search for a descendant (or self) by name.
    pub fn find(&self, name: &str) -> Option<&ControlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ControlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(name))
    }

    /// Names of this node and all descendants, pre-order.
    pub fn names(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        out.push(self.name.clone());
        for c in &self.children {
            c.collect_names(out);
        }
    }

    /// Visit this node and every descendant, children first.
    pub fn visit_post_order<E>(
        &mut self,
        f: &mut impl FnMut(&mut ControlNode) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        for c in &mut self.children {
            c.visit_post_order(f)?;
        }
        f(self)
    }

    /// Check names are non-empty and unique across the whole subtree, and
    /// function names unique per node.
    pub fn validate(&self, file: &str) -> Result<()> {
        let mut seen = HashSet::new();
        self.validate_into(file, &mut seen)
    }

    fn validate_into<'a>(&'a self, file: &str, seen: &mut HashSet<&'a str>) -> Result<()> {
        if self.name.is_empty() {
            return Err(SourceError::structural(file, "control with an empty name"));
        }
        if !seen.insert(self.name.as_str()) {
            return Err(SourceError::structural(
                file,
                format!("duplicate control name '{}'", self.name),
            ));
        }

        let mut fns = HashSet::new();
        for func in &self.functions {
            if !fns.insert(func.name.as_str()) {
                return Err(SourceError::structural(
                    file,
                    format!("duplicate function '{}' on '{}'", func.name, self.name),
                ));
            }
        }

        for c in &self.children {
            c.validate_into(file, seen)?;
        }
        Ok(())
    }
}
