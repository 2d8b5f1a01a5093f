//! In-memory control tree, its editor-side metadata and addressing.

pub mod editor_state;
pub mod entropy;
pub mod node;
pub mod path;

pub use editor_state::{EditorStateEntry, EditorStateStore, RuleState};
pub use entropy::Entropy;
pub use node::{ControlNode, FunctionDef, Property, SourceSpan, TypeRef};
pub use path::ControlPath;
