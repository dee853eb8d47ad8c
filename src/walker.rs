//! Recursive discovery of stage input files.
//!
//! A [`TreeWalker`] yields one [`DocumentRecord`] per regular file under its
//! root whose name ends with an accepted extension. Relative paths are taken
//! against the walk root, never a global input directory, so every stage can
//! mirror the tree it reads into the tree it writes.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One discovered input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Absolute location of the file.
    pub absolute_path: PathBuf,
    /// Location relative to the walk root, e.g. `a/b/c.pdf`.
    pub relative_path: PathBuf,
}

impl DocumentRecord {
    /// Relative path with `/` separators regardless of platform.
    pub fn relative_display(&self) -> String {
        slash_path(&self.relative_path)
    }
}

/// Render a relative path with `/` separators.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Filtered recursive file walker.
///
/// Walking is lazy and can be repeated: each call to [`TreeWalker::walk`]
/// starts a fresh traversal. Entries are visited in file-name order, so two
/// walks of an unchanged tree yield the same sequence.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    extensions: Vec<String>,
    follow_links: bool,
}

impl TreeWalker {
    /// Create a walker over `root` accepting the given extensions.
    ///
    /// Extensions match case-insensitively against the end of the file name;
    /// a missing leading dot is added (`"pdf"` and `".PDF"` are equivalent).
    pub fn new(root: impl Into<PathBuf>, extensions: &[&str]) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| {
                let ext = ext.to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect();
        Self {
            root: root.into(),
            extensions,
            follow_links: false,
        }
    }

    /// Configure whether symlinked directories are descended into.
    ///
    /// Symlinked files are always yielded; only directory links depend on this.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a file name passes the extension filter.
    pub fn accepts(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Lazily enumerate matching files under the root.
    ///
    /// Unreadable entries are logged and skipped. A missing root yields an
    /// empty sequence; callers that need to distinguish that case check the
    /// root before walking.
    pub fn walk(&self) -> impl Iterator<Item = DocumentRecord> + '_ {
        let absolute_root = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());

        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(
                        root = %self.root.display(),
                        error = %err,
                        "Skipping unreadable directory entry"
                    );
                    None
                }
            })
            .filter(|entry| {
                entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
            })
            .filter(move |entry| self.accepts(&entry.file_name().to_string_lossy()))
            .filter_map(move |entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();
                debug!("Found file: {}", entry.path().display());
                Some(DocumentRecord {
                    absolute_path: absolute_root.join(&relative),
                    relative_path: relative,
                })
            })
    }
}
