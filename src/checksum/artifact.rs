//! `checksum.json`: the stamped digests stored next to an unpacked source tree.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::engine::ArchiveChecksum;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChecksumArtifact {
    /// Digest of the archive the source tree was unpacked from.
    pub client_stamped_checksum: String,
    pub client_per_file_checksums: BTreeMap<String, String>,
    /// Digest recorded by the service that produced the archive, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_stamped_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_per_file_checksums: Option<BTreeMap<String, String>>,
}

/// Content differs from what a stored checksum says. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatchWarning {
    /// `None` for the whole-archive digest.
    pub entry: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl fmt::Display for ChecksumMismatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = self.entry.as_deref().unwrap_or("<archive>");
        match (&self.expected, &self.actual) {
            (Some(e), Some(a)) => write!(f, "checksum mismatch for {what}: expected {e}, got {a}"),
            (Some(_), None) => write!(f, "checksum mismatch: {what} is missing"),
            (None, Some(_)) => write!(f, "checksum mismatch: {what} is new"),
            (None, None) => write!(f, "checksum mismatch for {what}"),
        }
    }
}

impl ChecksumArtifact {
    pub fn from_checksum(checksum: &ArchiveChecksum) -> Self {
        Self {
            client_stamped_checksum: checksum.render(),
            client_per_file_checksums: checksum.per_entry(),
            server_stamped_checksum: None,
            server_per_file_checksums: None,
        }
    }

    /// Compare against a fresh checksum, logging and returning every difference.
    ///
    /// Per-file differences are only listed when the whole digests disagree.
    pub fn verify(&self, actual: &ArchiveChecksum) -> Vec<ChecksumMismatchWarning> {
        let mut warnings = Vec::new();
        let rendered = actual.render();
        if rendered == self.client_stamped_checksum {
            return warnings;
        }

        warnings.push(ChecksumMismatchWarning {
            entry: None,
            expected: Some(self.client_stamped_checksum.clone()),
            actual: Some(rendered),
        });

        let actual_files = actual.per_entry();
        for (path, expected) in &self.client_per_file_checksums {
            match actual_files.get(path) {
                Some(a) if a == expected => {}
                other => warnings.push(ChecksumMismatchWarning {
                    entry: Some(path.clone()),
                    expected: Some(expected.clone()),
                    actual: other.cloned(),
                }),
            }
        }
        for (path, a) in &actual_files {
            if !self.client_per_file_checksums.contains_key(path) {
                warnings.push(ChecksumMismatchWarning {
                    entry: Some(path.clone()),
                    expected: None,
                    actual: Some(a.clone()),
                });
            }
        }

        for w in &warnings {
            warn!("{w}");
        }
        warnings
    }
}
