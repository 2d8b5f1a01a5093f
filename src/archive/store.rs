//! Entry-level access to an app archive.
//!
//! Paths are normalized on the way in (forward slashes, no leading slash)
//! and compared case-insensitively. Entries keep the order they were added
//! in, which is the order they are written back to a zip.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipArchive, ZipWriter};

use crate::error::{Result, SourceError};
use crate::infra::path_codec::{archive_key, normalize_archive_path};

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: usize = 1 << 20;

/// One file in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized path with its original casing.
    pub path: String,
    pub bytes: Vec<u8>,
}

pub trait ArchiveStore {
    fn get_entry(&self, path: &str) -> Option<&ArchiveEntry>;

    /// Add an entry; a path already present (in any casing) is an error.
    fn create_entry(&mut self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Entries under `prefix` whose name ends with `extension`, in
    /// archive order. Both filters are case-insensitive; empty matches all.
    fn enumerate_entries(&self, prefix: &str, extension: &str) -> Vec<&ArchiveEntry>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryArchive {
    entries: IndexMap<String, ArchiveEntry>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values()
    }

    /// Remove and return an entry.
    pub fn take_entry(&mut self, path: &str) -> Option<ArchiveEntry> {
        self.entries.shift_remove(&archive_key(path))
    }

    /// `(path, bytes)` pairs for the checksum engine.
    pub fn to_pairs(&self) -> Vec<(String, Vec<u8>)> {
        self.iter()
            .map(|e| (e.path.clone(), e.bytes.clone()))
            .collect()
    }

    /// Load every file entry of a zip. On duplicate paths the first wins.
    #[instrument(skip_all)]
    pub fn from_zip_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;
        let mut archive = Self::new();

        for idx in 0..zip.len() {
            let mut file = zip.by_index(idx)?;
            if file.is_dir() || file.name().ends_with('/') {
                continue;
            }
            let path = normalize_archive_path(file.name());
            if path.is_empty() {
                continue;
            }

            // Declared sizes are untrusted.
            let declared = usize::try_from(file.size()).unwrap_or(usize::MAX);
            let mut bytes = Vec::with_capacity(declared.min(MAX_PREALLOC));
            file.read_to_end(&mut bytes)
                .map_err(|e| SourceError::io(&path, e))?;

            match archive.create_entry(&path, bytes) {
                Ok(()) => {}
                Err(SourceError::DuplicateEntry(_)) => {
                    warn!(entry = %path, "duplicate archive entry, keeping the first");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(entries = archive.len(), "archive loaded");
        Ok(archive)
    }

    pub fn read_zip(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
        Self::from_zip_reader(file)
    }

    /// Write every entry, in order, with a fixed timestamp so identical
    /// content gives identical bytes.
    pub fn write_zip_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(ZipDateTime::default())
            .unix_permissions(0o644);

        for entry in self.iter() {
            zip.start_file(entry.path.as_str(), options)?;
            zip.write_all(&entry.bytes)
                .map_err(|e| SourceError::io(&entry.path, e))?;
        }
        Ok(zip.finish()?)
    }

    /// Write to `path` through a temp file in the same directory; `path`
    /// is only replaced once the zip is complete.
    #[instrument(skip(self), fields(entries = self.len()))]
    pub fn write_zip(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| SourceError::io(dir, e))?;
        let staged = self.write_zip_to(staged)?;
        staged
            .persist(path)
            .map_err(|e| SourceError::io(path, e.error))?;
        Ok(())
    }
}

impl ArchiveStore for MemoryArchive {
    fn get_entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.get(&archive_key(path))
    }

    fn create_entry(&mut self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let path = normalize_archive_path(path);
        let key = path.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(SourceError::DuplicateEntry(path));
        }
        self.entries.insert(key, ArchiveEntry { path, bytes });
        Ok(())
    }

    fn enumerate_entries(&self, prefix: &str, extension: &str) -> Vec<&ArchiveEntry> {
        let prefix = archive_key(prefix);
        let extension = extension.to_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix) && key.ends_with(&extension))
            .map(|(_, e)| e)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample() -> MemoryArchive {
        let mut a = MemoryArchive::new();
        a.create_entry("Header.json", b"{}".to_vec()).unwrap();
        a.create_entry("\\Controls\\1.json", b"{\"a\":1}".to_vec()).unwrap();
        a.create_entry("Controls/2.json", b"{\"a\":2}".to_vec()).unwrap();
        a.create_entry("Assets/Images/logo.PNG", vec![0x89, b'P', b'N', b'G']).unwrap();
        a
    }

    #[test]
    fn lookups_are_normalized_and_case_insensitive() {
        let a = sample();
        assert_eq!(a.get_entry("controls\\1.JSON").unwrap().path, "Controls/1.json");
        assert!(a.get_entry("/Header.json").is_some());
        assert!(a.get_entry("Missing.json").is_none());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mut a = sample();
        let err = a.create_entry("HEADER.JSON", vec![]).unwrap_err();
        assert!(matches!(err, SourceError::DuplicateEntry(p) if p == "HEADER.JSON"));
    }

    #[test]
    fn enumerate_filters_by_prefix_and_extension() {
        let a = sample();
        let controls: Vec<_> = a
            .enumerate_entries("Controls/", ".json")
            .into_iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(controls, vec!["Controls/1.json", "Controls/2.json"]);
        assert_eq!(a.enumerate_entries("assets", ".png").len(), 1);
        assert_eq!(a.enumerate_entries("", "").len(), 4);
    }

    #[test]
    fn zip_round_trip_keeps_entries_and_order() {
        let a = sample();
        let bytes = a.write_zip_to(Cursor::new(Vec::new())).unwrap().into_inner();
        let b = MemoryArchive::from_zip_reader(Cursor::new(bytes.clone())).unwrap();
        assert_eq!(a, b);

        // Same content, same bytes.
        let again = b.write_zip_to(Cursor::new(Vec::new())).unwrap().into_inner();
        assert_eq!(bytes, again);
    }

    #[test]
    fn duplicate_zip_entries_keep_the_first() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("a.json", options).unwrap();
        zip.write_all(b"1").unwrap();
        zip.start_file("A.json", options).unwrap();
        zip.write_all(b"2").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let a = MemoryArchive::from_zip_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.get_entry("a.json").unwrap().bytes, b"1");
    }

    #[test]
    fn write_zip_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.msapp");
        sample().write_zip(&path).unwrap();
        assert_eq!(MemoryArchive::read_zip(&path).unwrap(), sample());
    }

    #[test]
    fn entries_past_the_preallocation_cap_read_in_full() {
        let big = vec![7u8; MAX_PREALLOC + 17];
        let mut a = MemoryArchive::new();
        a.create_entry("Assets/big.bin", big.clone()).unwrap();
        let bytes = a.write_zip_to(Cursor::new(Vec::new())).unwrap().into_inner();

        let b = MemoryArchive::from_zip_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(b.get_entry("Assets/big.bin").unwrap().bytes, big);
    }
}
