//! Output directory conventions.
//!
//! ```text
//! results-<project>/
//! ├── tree.txt
//! ├── src/main.rs-security.md          per-file artifact
//! ├── high_level_analysis_security.md  aggregate artifact
//! └── .analysis-complete               written only after a full run
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::ignore::rooted_path;
use super::AnalysisError;

/// Name of the persisted tree document.
pub const TREE_FILE: &str = "tree.txt";

/// Name of the marker written after a complete run.
pub const COMPLETION_MARKER: &str = ".analysis-complete";

/// Prefix of aggregate artifact names.
pub const AGGREGATE_PREFIX: &str = "high_level_analysis_";

/// Spacer appended after each artifact in aggregate content.
const AGGREGATE_SPACER: &str = "\n\n\n";

/// Paths of every artifact a run produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the tree document path.
    pub fn tree_path(&self) -> PathBuf {
        self.root.join(TREE_FILE)
    }

    /// Returns the completion marker path.
    pub fn completion_marker(&self) -> PathBuf {
        self.root.join(COMPLETION_MARKER)
    }

    /// Returns the per-file artifact path, `<relative>-<analyzer>.md`.
    pub fn file_artifact(&self, relative: &str, analyzer: &str) -> PathBuf {
        self.root.join(format!("{relative}-{analyzer}.md"))
    }

    /// Returns the aggregate artifact path for `analyzer`.
    pub fn aggregate_artifact(&self, analyzer: &str) -> PathBuf {
        self.root.join(format!("{AGGREGATE_PREFIX}{analyzer}.md"))
    }

    /// Removes the output directory if present and recreates it empty.
    pub fn reset(&self) -> Result<(), AnalysisError> {
        let access = |source| AnalysisError::FileAccess {
            path: self.root.clone(),
            source,
        };
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "Removed previous output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(access(e)),
        }
        fs::create_dir_all(&self.root).map_err(access)
    }

    /// Writes an artifact, creating parent directories as needed.
    pub fn write(&self, path: &Path, text: &str) -> Result<(), AnalysisError> {
        let access = |source| AnalysisError::FileAccess {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(access)?;
        }
        fs::write(path, text).map_err(access)
    }

    /// Returns the analyzer a per-file artifact belongs to, with the
    /// artifact's relative path stripped of the analyzer suffix.
    ///
    /// The analyzer with the longest matching `-<name>.md` suffix wins, so
    /// `a.rs-x-y.md` belongs to `x-y` rather than `y` when both exist.
    /// Run bookkeeping files at the output root are never attributed.
    pub fn attribute<'a>(&self, relative: &str, analyzers: &[&'a str]) -> Option<(&'a str, String)> {
        if self.is_bookkeeping(relative, analyzers) {
            return None;
        }
        analyzers
            .iter()
            .filter_map(|&name| {
                relative
                    .strip_suffix(&format!("-{name}.md"))
                    .filter(|stem| !stem.is_empty())
                    .map(|stem| (name, stem.to_string()))
            })
            .max_by_key(|(name, _)| name.len())
    }

    fn is_bookkeeping(&self, relative: &str, analyzers: &[&str]) -> bool {
        relative == TREE_FILE
            || relative == COMPLETION_MARKER
            || analyzers
                .iter()
                .any(|name| relative == format!("{AGGREGATE_PREFIX}{name}.md"))
    }

    /// Scans the output directory and builds each analyzer's aggregate
    /// content from its per-file artifacts.
    ///
    /// Artifacts are visited in lexicographic order. Each contributes a
    /// `Filename: <path>` label, its text and a spacer, all joined with a
    /// blank line. Every analyzer gets an entry, empty when it has no
    /// artifacts.
    pub fn collect_aggregate_inputs(
        &self,
        analyzers: &[&str],
    ) -> Result<BTreeMap<String, String>, AnalysisError> {
        let mut parts: BTreeMap<String, Vec<String>> = analyzers
            .iter()
            .map(|name| ((*name).to_string(), Vec::new()))
            .collect();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable output entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let relative = rooted_path(relative);
            let relative = relative.strip_prefix('/').unwrap_or(&relative);
            let Some((analyzer, stem)) = self.attribute(relative, analyzers) else {
                continue;
            };

            let text = fs::read_to_string(entry.path()).map_err(|source| AnalysisError::FileAccess {
                path: entry.path().to_path_buf(),
                source,
            })?;
            if let Some(list) = parts.get_mut(analyzer) {
                list.push(format!("Filename: {stem}"));
                list.push(text);
                list.push(AGGREGATE_SPACER.to_string());
            }
        }

        Ok(parts
            .into_iter()
            .map(|(name, list)| (name, list.join("\n\n")))
            .collect())
    }
}
