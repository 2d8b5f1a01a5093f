use std::fs;
use std::path::Path;

use crate::error::{Result, SourceError};
use crate::infra::path_codec::to_platform_path;

/// Read a UTF-8 file under `root` by its forward-slash relative path.
pub fn read_text(root: &Path, rel: &str) -> Result<String> {
    let path = root.join(to_platform_path(rel));
    fs::read_to_string(&path).map_err(|e| SourceError::io(path, e))
}

pub fn read_bytes(root: &Path, rel: &str) -> Result<Vec<u8>> {
    let path = root.join(to_platform_path(rel));
    fs::read(&path).map_err(|e| SourceError::io(path, e))
}

/// Whether `rel` exists under `root`.
pub fn exists(root: &Path, rel: &str) -> bool {
    root.join(to_platform_path(rel)).is_file()
}

/// Write a file under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &[u8]) -> Result<()> {
    let path = root.join(to_platform_path(rel));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SourceError::io(parent, e))?;
    }
    fs::write(&path, contents).map_err(|e| SourceError::io(path, e))
}

/// Pretty JSON with a trailing newline, the way every source-tree JSON file
/// is written.
pub fn to_pretty_json<T: serde::Serialize>(file: &str, value: &T) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(value).map_err(|e| SourceError::json(file, e))?;
    out.push(b'\n');
    Ok(out)
}

pub fn from_json<T: serde::de::DeserializeOwned>(file: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| SourceError::json(file, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a/b/c.txt", b"hello").unwrap();
        assert!(exists(dir.path(), "a/b/c.txt"));
        assert_eq!(read_text(dir.path(), "a/b/c.txt").unwrap(), "hello");
        assert!(!exists(dir.path(), "a/b"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bytes(dir.path(), "nope.json").unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn json_errors_carry_the_file() {
        let err = from_json::<serde_json::Value>("Header.json", b"{ nope").unwrap_err();
        assert!(matches!(err, SourceError::Parse { ref file, line: Some(1), .. } if file == "Header.json"));
    }
}
