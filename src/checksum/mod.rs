//! Canonical archive checksums.

pub mod artifact;
pub mod engine;
pub mod hasher;
pub mod json;

pub use artifact::{ChecksumArtifact, ChecksumMismatchWarning};
pub use engine::{ArchiveChecksum, ChecksumEngine, ChecksumEntry, render_digest};
pub use hasher::{Blake3Hasher, CanonicalHasher, DebugTextHasher};
pub use json::JsonNode;
