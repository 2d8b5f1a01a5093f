//! Structural checksum over an archive.
//!
//! Two archives that differ only in JSON key order, duplicate keys written by
//! the server, formula whitespace, line endings or the escaping of nested
//! documents produce the same digest.
//!
//! Per document:
//! - object members are deduplicated (first wins), null members skipped and
//!   the rest visited in ordinal key order;
//! - `InvariantScript` values have whitespace runs collapsed;
//! - strings at configured paths are parsed as nested JSON or XML and hashed
//!   structurally;
//! - other strings lose leading whitespace and CRLF becomes LF.
//!
//! Per archive: one digest per entry, then a digest over the entry digests
//! in case-insensitive path order.

use std::collections::{BTreeMap, HashSet};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use tracing::{debug, instrument};

use super::hasher::{Blake3Hasher, CanonicalHasher};
use super::json::JsonNode;
use crate::error::{Result, SourceError};
use crate::infra::config::ChecksumConfig;
use crate::infra::path_codec::normalize_archive_path;

const FORMULA_PROPERTY: &str = "InvariantScript";
const PATH_SEPARATOR: char = '\\';

/// Digest of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub entry_path: String,
    pub digest: Vec<u8>,
}

/// Whole-archive digest plus the per-entry digests it was built from.
#[derive(Debug, Clone)]
pub struct ArchiveChecksum {
    pub version_tag: String,
    pub digest: Vec<u8>,
    /// Sorted by case-insensitive path.
    pub entries: Vec<ChecksumEntry>,
}

impl ArchiveChecksum {
    /// `<tag>_<base64>` form of the whole-archive digest.
    pub fn render(&self) -> String {
        render_digest(&self.version_tag, &self.digest)
    }

    pub fn per_entry(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.entry_path.clone(), render_digest(&self.version_tag, &e.digest)))
            .collect()
    }
}

pub fn render_digest(version_tag: &str, digest: &[u8]) -> String {
    format!("{version_tag}_{}", BASE64.encode(digest))
}

#[derive(Debug, Clone)]
pub struct ChecksumEngine {
    config: ChecksumConfig,
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self::new(ChecksumConfig::default())
    }
}

impl ChecksumEngine {
    pub fn new(config: ChecksumConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChecksumConfig {
        &self.config
    }

    /// Whether `path` names the checksum artifact, which is never hashed.
    pub fn is_artifact(&self, path: &str) -> bool {
        let normalized = normalize_archive_path(path);
        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
        file_name.eq_ignore_ascii_case(&self.config.artifact_name)
    }

    /// Digest a whole archive given its entries as `(path, bytes)`.
    #[instrument(skip_all)]
    pub fn archive_checksum<I>(&self, entries: I) -> Result<ArchiveChecksum>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut digests = Vec::new();
        for (path, bytes) in entries {
            let path = normalize_archive_path(&path);
            if self.is_artifact(&path) {
                continue;
            }
            let digest = self.entry_digest::<Blake3Hasher>(&path, &bytes)?;
            digests.push(ChecksumEntry {
                entry_path: path,
                digest,
            });
        }

        digests.sort_by(|a, b| {
            a.entry_path
                .to_lowercase()
                .cmp(&b.entry_path.to_lowercase())
                .then_with(|| a.entry_path.cmp(&b.entry_path))
        });

        let mut whole = Blake3Hasher::new();
        for entry in &digests {
            whole.append_bytes(&entry.digest);
        }
        debug!(entries = digests.len(), "archive checksum computed");

        Ok(ArchiveChecksum {
            version_tag: self.config.version_tag.clone(),
            digest: whole.finalize(),
            entries: digests,
        })
    }

    /// Digest one entry with a fresh sink of type `H`.
    pub fn entry_digest<H>(&self, path: &str, bytes: &[u8]) -> Result<Vec<u8>>
    where
        H: CanonicalHasher + Default,
    {
        let mut hasher = H::default();
        if is_structured(path) {
            let doc = JsonNode::from_slice(bytes).map_err(|e| SourceError::json(path, e))?;
            self.hash_document(path, &doc, &mut hasher)?;
        } else {
            hasher.append_bytes(bytes);
        }
        Ok(hasher.finalize())
    }

    /// Feed a parsed document into `hasher`. `file` only labels errors.
    pub fn hash_document<H: CanonicalHasher>(
        &self,
        file: &str,
        doc: &JsonNode,
        hasher: &mut H,
    ) -> Result<()> {
        let mut walker = Walker {
            config: &self.config,
            file,
            path: Vec::new(),
            hasher,
        };
        walker.value(doc)
    }
}

fn is_structured(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".json") || lower.ends_with(".sarif")
}

struct Walker<'a, H> {
    config: &'a ChecksumConfig,
    file: &'a str,
    /// Enclosing property names; arrays do not push.
    path: Vec<String>,
    hasher: &'a mut H,
}

impl<H: CanonicalHasher> Walker<'_, H> {
    fn value(&mut self, node: &JsonNode) -> Result<()> {
        match node {
            JsonNode::Null => self.hasher.append_null(),
            JsonNode::Bool(b) => self.hasher.append_bool(*b),
            JsonNode::Number(n) => self.hasher.append_number(*n),
            JsonNode::String(s) => self.string(s)?,
            JsonNode::Array(items) => {
                self.hasher.start_array();
                for item in items {
                    self.value(item)?;
                }
                self.hasher.end_array();
            }
            JsonNode::Object(members) => self.object(members)?,
        }
        Ok(())
    }

    fn object(&mut self, members: &[(String, JsonNode)]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut unique: Vec<&(String, JsonNode)> = members
            .iter()
            .filter(|(key, _)| seen.insert(key.as_str()))
            .collect();
        unique.sort_by(|a, b| a.0.cmp(&b.0));

        self.hasher.start_object();
        for (key, value) in unique {
            match value {
                JsonNode::Null => continue,
                JsonNode::String(script) if key == FORMULA_PROPERTY => {
                    self.hasher.property_name_skipped(key);
                    self.hasher.append_string(&collapse_whitespace(script));
                }
                _ => {
                    self.hasher.property_name(key);
                    self.path.push(key.clone());
                    let res = self.value(value);
                    self.path.pop();
                    res?;
                }
            }
        }
        self.hasher.end_object();
        Ok(())
    }

    fn string(&mut self, s: &str) -> Result<()> {
        if self.matches(&self.config.json_double_paths) && !s.trim().is_empty() {
            let nested = JsonNode::from_str(s).map_err(|e| {
                SourceError::parse(
                    self.file,
                    None,
                    format!("nested JSON at {}: {e}", self.path.join("\\")),
                )
            })?;
            return self.value(&nested);
        }

        if self.matches(&self.config.xml_double_paths) && !s.trim().is_empty() {
            let canonical = canonical_xml(s).map_err(|e| {
                SourceError::parse(
                    self.file,
                    None,
                    format!("nested XML at {}: {e}", self.path.join("\\")),
                )
            })?;
            self.hasher.append_string(&canonical.replace("\r\n", "\n"));
            return Ok(());
        }

        self.hasher
            .append_string(&s.trim_start().replace("\r\n", "\n"));
        Ok(())
    }

    /// Match the last one or two path segments against an allowlist.
    fn matches(&self, list: &[String]) -> bool {
        let Some(last) = self.path.last() else {
            return false;
        };
        let pair = (self.path.len() >= 2)
            .then(|| format!("{}{PATH_SEPARATOR}{last}", self.path[self.path.len() - 2]));

        list.iter()
            .any(|p| p == last || pair.as_deref() == Some(p.as_str()))
    }
}

/// Collapse runs of space/tab/CR/LF to one space and drop trailing spaces.
pub fn collapse_whitespace(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut in_run = false;
    for c in script.chars() {
        if matches!(c, ' ' | '\t' | '\r' | '\n') {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out.truncate(out.trim_end_matches(' ').len());
    out
}

/// Re-serialize XML without comments, declarations or ignorable whitespace.
pub fn canonical_xml(text: &str) -> std::result::Result<String, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new(Vec::new());

    loop {
        let event = reader.read_event().map_err(|e| {
            format!("{e} at byte {}", reader.buffer_position())
        })?;
        match event {
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            other => writer.write_event(other).map_err(|e| e.to_string())?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}
