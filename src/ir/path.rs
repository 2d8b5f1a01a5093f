//! Addressing a control from a root by name segments.

use std::fmt;

/// Immutable path of control names, consumed front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ControlPath {
    segments: Vec<String>,
}

impl ControlPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// First unconsumed segment, or `""` once exhausted.
    pub fn current(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// The path without its first segment.
    pub fn next(&self) -> ControlPath {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    pub fn append(&self, name: impl Into<String>) -> ControlPath {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
