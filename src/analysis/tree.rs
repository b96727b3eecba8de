//! Indented ASCII rendering of the project directory hierarchy.

use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ignore::{relative_to, rooted_path};
use super::AnalysisError;

/// Path fragment that marks version-control metadata.
pub const VCS_MARKER: &str = ".git";

const TEE: &str = "├── ";
const CORNER: &str = "└── ";
const BAR: &str = "│   ";
const BLANK: &str = "    ";

/// The rendered project tree, shared read-only by every prompt of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeDocument {
    text: String,
}

impl TreeDocument {
    /// Returns the rendered text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Writes the tree to `path` for operator inspection.
    pub fn persist(&self, path: &Path) -> Result<(), AnalysisError> {
        fs::write(path, &self.text).map_err(|source| AnalysisError::FileAccess {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Renders a directory into a [`TreeDocument`].
///
/// Entries are listed in lexicographic order. Any entry whose path contains
/// [`VCS_MARKER`] is skipped entirely, as is an explicitly excluded
/// directory (the run's own output directory). Symlinked directories are
/// listed but not descended into.
#[derive(Debug, Default)]
pub struct TreeRenderer {
    excluded: Vec<PathBuf>,
}

impl TreeRenderer {
    /// Creates a renderer with no extra exclusions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips `path` and everything beneath it.
    #[must_use]
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Renders the tree rooted at `root`.
    ///
    /// The first line is the root's base name followed by `/`; each visited
    /// entry follows on its own line with a connector and the continuation
    /// bars of its ancestors.
    pub fn render(&self, root: &Path) -> Result<TreeDocument, AnalysisError> {
        let name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
        let entries = self
            .visible_entries(root, root)
            .map_err(|source| AnalysisError::FileAccess {
                path: root.to_path_buf(),
                source,
            })?;

        let mut text = format!("{name}/\n");
        self.render_entries(root, &entries, "", &mut text);
        debug!(lines = text.lines().count(), "Rendered project tree");
        Ok(TreeDocument { text })
    }

    /// Lists `dir` sorted by name, without hidden or excluded entries.
    fn visible_entries(&self, root: &Path, dir: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(DirEntry::file_name);
        entries.retain(|entry| self.is_visible(root, &entry.path()));
        Ok(entries)
    }

    /// Unreadable subdirectories are listed without children.
    fn render_entries(&self, root: &Path, entries: &[DirEntry], prefix: &str, out: &mut String) {
        for (index, entry) in entries.iter().enumerate() {
            let is_last = index + 1 == entries.len();
            let (connector, extension) = if is_last { (CORNER, BLANK) } else { (TEE, BAR) };
            out.push_str(prefix);
            out.push_str(connector);
            out.push_str(&entry.file_name().to_string_lossy());
            out.push('\n');

            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let path = entry.path();
            match self.visible_entries(root, &path) {
                Ok(children) => {
                    self.render_entries(root, &children, &format!("{prefix}{extension}"), out);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable directory"),
            }
        }
    }

    fn is_visible(&self, root: &Path, path: &Path) -> bool {
        if rooted_path(&relative_to(path, root)).contains(VCS_MARKER) {
            return false;
        }
        !self.excluded.iter().any(|excluded| path.starts_with(excluded))
    }
}
