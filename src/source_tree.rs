//! Unpack an archive into an editable source tree, and pack it back.
//!
//! Layout of a source tree:
//!
//! ```text
//! CanvasManifest.json                 header, properties, screen order
//! Src/<Screen>.fx.yaml                one file per screen
//! Src/Components/<Component>.fx.yaml  one file per component
//! Src/EditorState/<Root>.editorstate.json
//! References/*.json                   templates, themes, data sources, resources
//! Connections/Connections.json
//! Entropy/Entropy.json
//! checksum.json
//! Other/<escaped path>                archive entries carried verbatim
//! ```
//!
//! File stems come from [`crate::infra::path_codec`], so any control name
//! maps to a valid, bounded file name.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::archive::MemoryArchive;
use crate::archive::ArchiveStore;
use crate::archive::entries::{CONNECTIONS, DATA_SOURCES, RESOURCES, TEMPLATES, THEMES};
use crate::checksum::{ArchiveChecksum, ChecksumArtifact, ChecksumEngine, ChecksumMismatchWarning};
use crate::document::{AppDocument, DocumentProperties, Header};
use crate::error::{Result, SourceError};
use crate::infra::config::Config;
use crate::infra::io::{exists, from_json, read_bytes, read_text, to_pretty_json, write_file};
use crate::infra::path_codec::{escape, file_stem_for, unescape};
use crate::infra::walk::SourceWalker;
use crate::ir::{ControlNode, EditorStateEntry, EditorStateStore};
use crate::templates::{TemplateStore, TemplatesManifest};
use crate::text;
use crate::transforms::SourceTransformPipeline;

pub const MANIFEST: &str = "CanvasManifest.json";
pub const SRC_DIR: &str = "Src";
pub const COMPONENTS_SRC_DIR: &str = "Src/Components";
pub const EDITOR_STATE_DIR: &str = "Src/EditorState";
pub const ENTROPY: &str = "Entropy/Entropy.json";
pub const OTHER_DIR: &str = "Other";
pub const SOURCE_EXT: &str = ".fx.yaml";
pub const EDITOR_STATE_EXT: &str = ".editorstate.json";

/// Format of the tree layout itself.
const FORMAT_VERSION: &str = "0.1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CanvasManifest {
    pub format_version: String,
    pub header: Header,
    pub properties: DocumentProperties,
    #[serde(default)]
    pub screen_order: Vec<String>,
}

/// Editor state of every control under one root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EditorStateFile {
    pub top_parent_name: String,
    pub control_states: IndexMap<String, EditorStateEntry>,
}

#[derive(Debug, Clone)]
pub struct UnpackReport {
    pub checksum: ArchiveChecksum,
    /// Differences between the archive and its in-memory repack.
    pub warnings: Vec<ChecksumMismatchWarning>,
    pub files_written: usize,
}

#[derive(Debug, Clone)]
pub struct PackReport {
    pub checksum: ArchiveChecksum,
    /// Differences from the checksum stored at unpack time.
    pub warnings: Vec<ChecksumMismatchWarning>,
    pub entries: usize,
}

fn source_path(root: &ControlNode, component: bool) -> String {
    let dir = if component { COMPONENTS_SRC_DIR } else { SRC_DIR };
    format!("{dir}/{}{SOURCE_EXT}", file_stem_for(&root.name))
}

fn editor_state_path(root: &ControlNode) -> String {
    format!("{EDITOR_STATE_DIR}/{}{EDITOR_STATE_EXT}", file_stem_for(&root.name))
}

/// Names whose editor state belongs in a root's state file: the tree itself
/// plus row templates folded into their galleries.
fn state_names(doc: &AppDocument, root: &ControlNode) -> Vec<String> {
    let mut names = root.names();
    let folded: Vec<String> = names
        .iter()
        .filter_map(|n| doc.editor_states.get(n)?.gallery_template_child_name.clone())
        .filter(|row| !names.contains(row))
        .collect();
    names.extend(folded);
    names
}

fn other_path(entry_path: &str) -> String {
    let escaped: Vec<String> = entry_path
        .split('/')
        .map(|seg| match seg {
            // Never let an entry climb out of the tree.
            "." | ".." => seg.replace('.', "%2E"),
            _ => escape(seg),
        })
        .collect();
    format!("{OTHER_DIR}/{}", escaped.join("/"))
}

/// Unpack a zip on disk into `out_dir`.
#[instrument(skip(config))]
pub fn unpack(archive_path: &Path, out_dir: &Path, config: &Config, overwrite: bool) -> Result<UnpackReport> {
    let archive = MemoryArchive::read_zip(archive_path)?;
    check_out_dir(out_dir, overwrite)?;
    unpack_archive(&archive, out_dir, config)
}

/// Refuse a non-empty directory unless it is an old source tree and
/// `overwrite` is set. Nothing is removed here.
fn check_out_dir(out_dir: &Path, overwrite: bool) -> Result<()> {
    let non_empty = fs::read_dir(out_dir)
        .map(|mut d| d.next().is_some())
        .unwrap_or(false);
    if !non_empty || (overwrite && exists(out_dir, MANIFEST)) {
        return Ok(());
    }
    Err(SourceError::io(
        out_dir,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "directory is not empty (pass overwrite to replace an existing source tree)",
        ),
    ))
}

/// Unpack into `out_dir`, replacing whatever is there once the whole tree
/// has been built and written to a staging directory beside it.
pub fn unpack_archive(archive: &MemoryArchive, out_dir: &Path, config: &Config) -> Result<UnpackReport> {
    let engine = ChecksumEngine::new(config.checksum.clone());
    let pipeline = SourceTransformPipeline::default();

    let checksum = engine.archive_checksum(archive.to_pairs())?;
    let doc = AppDocument::from_archive(archive, &pipeline)?;
    doc.validate()?;

    let artifact = ChecksumArtifact::from_checksum(&checksum);
    let warnings = if config.source.verify_checksum {
        let repacked = doc.to_archive(&pipeline)?;
        artifact.verify(&engine.archive_checksum(repacked.to_pairs())?)
    } else {
        Vec::new()
    };

    let mut files = render_source_tree(&doc, config)?;
    let artifact_name = &config.checksum.artifact_name;
    if files
        .insert(artifact_name.clone(), to_pretty_json(artifact_name, &artifact)?)
        .is_some()
    {
        return Err(SourceError::structural(artifact_name, "checksum artifact collides with a source file"));
    }
    write_staged(&files, out_dir)?;

    info!(files = files.len(), checksum = %checksum.render(), "unpacked");
    Ok(UnpackReport {
        checksum,
        warnings,
        files_written: files.len(),
    })
}

/// Write `files` into a fresh directory next to `out_dir`, then swap it in.
/// A previous `out_dir` is moved aside first and restored if the swap fails.
fn write_staged(files: &BTreeMap<String, Vec<u8>>, out_dir: &Path) -> Result<()> {
    let parent = match out_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| SourceError::io(parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".apsrc-staged-")
        .tempdir_in(parent)
        .map_err(|e| SourceError::io(parent, e))?;
    let staged = staging.path().join("tree");
    for (path, bytes) in files {
        write_file(&staged, path, bytes)?;
    }
    fs::create_dir_all(&staged).map_err(|e| SourceError::io(&staged, e))?;

    // Dropping `previous` deletes the old tree once the new one is in place.
    let previous = tempfile::Builder::new()
        .prefix(".apsrc-previous-")
        .tempdir_in(parent)
        .map_err(|e| SourceError::io(parent, e))?;
    let moved_aside = previous.path().join("tree");
    let had_previous = out_dir.exists();
    if had_previous {
        debug!(dir = %out_dir.display(), "replacing previous source tree");
        fs::rename(out_dir, &moved_aside).map_err(|e| SourceError::io(out_dir, e))?;
    }
    if let Err(e) = fs::rename(&staged, out_dir) {
        if had_previous {
            if let Err(restore) = fs::rename(&moved_aside, out_dir) {
                warn!(error = %restore, dir = %out_dir.display(), "could not restore previous source tree");
            }
        }
        return Err(SourceError::io(out_dir, e));
    }
    Ok(())
}

/// Every file of a document's source tree, keyed by relative path.
pub fn render_source_tree(doc: &AppDocument, config: &Config) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut put = |path: String, bytes: Vec<u8>| -> Result<()> {
        if files.insert(path.clone(), bytes).is_some() {
            return Err(SourceError::structural(
                &path,
                "two controls map to the same source file name",
            ));
        }
        Ok(())
    };

    let manifest = CanvasManifest {
        format_version: FORMAT_VERSION.to_string(),
        header: doc.header.clone(),
        properties: doc.properties.clone(),
        screen_order: doc.screen_order(),
    };
    put(MANIFEST.to_string(), to_pretty_json(MANIFEST, &manifest)?)?;

    let roots = doc
        .screens
        .iter()
        .map(|s| (s, false))
        .chain(doc.components.iter().map(|c| (c, true)));
    for (root, component) in roots {
        let path = source_path(root, component);
        let text = text::emit(root);
        if config.source.validate_round_trip {
            text::verify_round_trip(&path, &text)?;
        }
        put(path, text.into_bytes())?;

        let states = EditorStateFile {
            top_parent_name: root.name.clone(),
            control_states: state_names(doc, root)
                .into_iter()
                .filter_map(|n| doc.editor_states.get(&n).map(|e| (n, e.clone())))
                .collect(),
        };
        let path = editor_state_path(root);
        let bytes = to_pretty_json(&path, &states)?;
        put(path, bytes)?;
    }

    put(TEMPLATES.to_string(), to_pretty_json(TEMPLATES, &doc.templates.to_manifest())?)?;
    if let Some(themes) = &doc.themes {
        put(THEMES.to_string(), to_pretty_json(THEMES, themes)?)?;
    }
    if let Some(sources) = &doc.data_sources {
        put(DATA_SOURCES.to_string(), to_pretty_json(DATA_SOURCES, sources)?)?;
    }
    if let Some(resources) = &doc.resources {
        put(RESOURCES.to_string(), to_pretty_json(RESOURCES, resources)?)?;
    }
    if let Some(connections) = &doc.connections {
        put(CONNECTIONS.to_string(), to_pretty_json(CONNECTIONS, connections)?)?;
    }
    put(ENTROPY.to_string(), to_pretty_json(ENTROPY, &doc.entropy)?)?;
    for entry in doc.other_entries.iter() {
        put(other_path(&entry.path), entry.bytes.clone())?;
    }

    Ok(files)
}

/// Read a source tree back into a document, plus its checksum artifact.
#[instrument]
pub fn read_source_tree(dir: &Path, artifact_name: &str) -> Result<(AppDocument, Option<ChecksumArtifact>)> {
    let manifest: CanvasManifest = from_json(MANIFEST, &read_bytes(dir, MANIFEST)?)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(SourceError::unsupported(
            MANIFEST,
            format!("source tree format {} is not {FORMAT_VERSION}", manifest.format_version),
        ));
    }

    let walker = SourceWalker::new();
    let mut doc = AppDocument {
        header: manifest.header,
        properties: manifest.properties,
        ..AppDocument::default()
    };

    let mut screens = Vec::new();
    for path in walker.walk_dir(dir, SRC_DIR, SOURCE_EXT) {
        if path.starts_with(&format!("{COMPONENTS_SRC_DIR}/")) {
            let mut root = text::parse(&path, &read_text(dir, &path)?)?;
            root.type_ref.is_component_definition = true;
            doc.components.push(root);
        } else if !path.starts_with(&format!("{EDITOR_STATE_DIR}/")) {
            screens.push(text::parse(&path, &read_text(dir, &path)?)?);
        }
    }
    doc.screens = order_screens(screens, &manifest.screen_order);

    for path in walker.walk_dir(dir, EDITOR_STATE_DIR, EDITOR_STATE_EXT) {
        let file: EditorStateFile = from_json(&path, &read_bytes(dir, &path)?)?;
        load_editor_states(&mut doc.editor_states, file)?;
    }

    doc.templates = match read_optional::<TemplatesManifest>(dir, TEMPLATES)? {
        Some(m) => TemplateStore::from_manifest(m)?,
        None => TemplateStore::new(),
    };
    doc.themes = read_optional(dir, THEMES)?;
    doc.data_sources = read_optional(dir, DATA_SOURCES)?;
    doc.resources = read_optional(dir, RESOURCES)?;
    doc.connections = read_optional(dir, CONNECTIONS)?;
    doc.entropy = read_optional(dir, ENTROPY)?.unwrap_or_default();

    for path in walker.walk_dir(dir, OTHER_DIR, "") {
        let entry_path = unescape(&path[OTHER_DIR.len() + 1..]);
        doc.other_entries
            .create_entry(&entry_path, read_bytes(dir, &path)?)?;
    }

    doc.validate()?;
    let artifact = read_optional(dir, artifact_name)?;
    Ok((doc, artifact))
}

fn read_optional<T: serde::de::DeserializeOwned>(dir: &Path, rel: &str) -> Result<Option<T>> {
    if !exists(dir, rel) {
        return Ok(None);
    }
    from_json(rel, &read_bytes(dir, rel)?).map(Some)
}

fn load_editor_states(store: &mut EditorStateStore, file: EditorStateFile) -> Result<()> {
    for (name, mut entry) in file.control_states {
        entry.name = name;
        store.insert(entry)?;
    }
    Ok(())
}

/// Screens in manifest order; screens the manifest does not list follow in
/// file order.
fn order_screens(mut screens: Vec<ControlNode>, order: &[String]) -> Vec<ControlNode> {
    let mut out = Vec::with_capacity(screens.len());
    for name in order {
        match screens.iter().position(|s| s.name == *name) {
            Some(pos) => out.push(screens.remove(pos)),
            None => warn!(screen = %name, "screen listed in the manifest has no source file"),
        }
    }
    out.extend(screens);
    out
}

/// Pack a source tree into an in-memory archive.
pub fn pack_to_archive(source_dir: &Path, config: &Config) -> Result<(MemoryArchive, PackReport)> {
    let engine = ChecksumEngine::new(config.checksum.clone());
    let (doc, artifact) = read_source_tree(source_dir, &config.checksum.artifact_name)?;
    let archive = doc.to_archive(&SourceTransformPipeline::default())?;
    let checksum = engine.archive_checksum(archive.to_pairs())?;

    let warnings = match (&artifact, config.source.verify_checksum) {
        (Some(a), true) => a.verify(&checksum),
        (None, true) => {
            debug!("no checksum artifact, skipping verification");
            Vec::new()
        }
        _ => Vec::new(),
    };
    let report = PackReport {
        checksum,
        warnings,
        entries: archive.len(),
    };
    Ok((archive, report))
}

/// Pack a source tree into a zip on disk.
#[instrument(skip(config))]
pub fn pack(source_dir: &Path, archive_path: &Path, config: &Config) -> Result<PackReport> {
    let (archive, report) = pack_to_archive(source_dir, config)?;
    archive.write_zip(archive_path)?;
    info!(entries = report.entries, checksum = %report.checksum.render(), "packed");
    Ok(report)
}
