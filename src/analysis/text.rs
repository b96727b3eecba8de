//! Text detection and file materialization.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::ignore::rooted_path;
use super::AnalysisError;

/// Bytes inspected when sniffing a file.
const SNIFF_LEN: u64 = 8 * 1024;

/// Returns whether `path` looks like a UTF-8 text file.
///
/// The first 8 KiB must contain no NUL byte and must decode as UTF-8,
/// tolerating a multi-byte character cut off at the sniff boundary.
/// Unreadable files are reported as not text.
pub fn is_probably_text(path: &Path) -> bool {
    let mut prefix = Vec::new();
    let read = File::open(path).and_then(|file| file.take(SNIFF_LEN).read_to_end(&mut prefix));
    if read.is_err() {
        return false;
    }
    if prefix.contains(&0) {
        return false;
    }
    match std::str::from_utf8(&prefix) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// A project file selected for analysis, with its text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// Path relative to the project root.
    pub relative_path: PathBuf,
    /// Decoded file content.
    pub content: String,
}

impl FileRecord {
    /// Reads a file as UTF-8 text.
    ///
    /// Content that is not valid UTF-8 is reported as a file access error
    /// of kind [`io::ErrorKind::InvalidData`].
    pub fn read(absolute_path: PathBuf, relative_path: PathBuf) -> Result<Self, AnalysisError> {
        let access = |source| AnalysisError::FileAccess {
            path: absolute_path.clone(),
            source,
        };
        let bytes = fs::read(&absolute_path).map_err(access)?;
        let content = String::from_utf8(bytes)
            .map_err(|e| access(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        Ok(Self {
            absolute_path,
            relative_path,
            content,
        })
    }

    /// Returns the relative path with `/` separators, as shown in prompts
    /// and artifact names.
    pub fn display_path(&self) -> String {
        let rooted = rooted_path(&self.relative_path);
        rooted.strip_prefix('/').unwrap_or(&rooted).to_string()
    }
}
