//! Source-tree walker.
//! - Every regular file is visited: no ignore files, no hidden-file policy
//! - Paths come back relative to the root, with forward slashes
//! - Deterministic ordering for stable packs and tests
//!
//! Backed by ripgrep's `ignore` crate with all of its filters switched off;
//! a source tree under version control must pack the same whatever
//! `.gitignore` files surround it.

use std::path::Path;

use ignore::WalkBuilder;
use tracing::warn;

/// Walker over the files of one source tree.
#[derive(Debug, Clone, Default)]
pub struct SourceWalker
{
    /// Maximum recursion depth; default None (unbounded)
    max_depth: Option<usize>,
}

impl SourceWalker
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// (Optional) Limit recursion depth (`None` = unbounded).
    pub fn with_max_depth(
        mut self,
        depth: Option<usize>,
    ) -> Self
    {
        self.max_depth = depth;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        b.standard_filters(false);
        b.hidden(false);
        b.follow_links(false);
        b.max_depth(self.max_depth);

        b
    }

    /// Relative paths of every file under `root`, sorted.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<String>
    {
        let root_path = root.as_ref();

        let mut out: Vec<String> = self
            .build_walk(root_path)
            .build()
            .filter_map(|res| match res
            {
                Ok(entry) => Some(entry),
                Err(e) =>
                {
                    warn!(error = %e, "skipping unreadable path");
                    None
                }
            })
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .filter_map(|entry| {
                let rel = entry
                    .path()
                    .strip_prefix(root_path)
                    .ok()?
                    .components()
                    .map(|c| {
                        c.as_os_str()
                            .to_string_lossy()
                            .into_owned()
                    })
                    .collect::<Vec<_>>()
                    .join("/");
                Some(rel)
            })
            .collect();

        out.sort();

        out
    }

    /// Files under `root/dir` ending in `suffix`, relative to `root`.
    pub fn walk_dir<P: AsRef<Path>>(
        &self,
        root: P,
        dir: &str,
        suffix: &str,
    ) -> Vec<String>
    {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.walk_files(root)
            .into_iter()
            .filter(|p| p.starts_with(&prefix) && p.ends_with(suffix))
            .collect()
    }
}
