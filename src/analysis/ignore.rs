//! File inclusion rules: ignore substrings plus a source suffix allow-list.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::AnalysisError;

/// Patterns that are always ignored, whatever the project says.
pub const BASE_PATTERNS: &[&str] = &[".git", ".gitignore"];

/// Project-root-relative ignore file whose lines extend the base patterns.
pub const PROJECT_IGNORE_FILE: &str = ".gitignore";

/// Built-in allow-list used when no suffix asset is supplied.
const EMBEDDED_SUFFIXES: &str = include_str!("../../assets/source-code-suffixes.toml");

#[derive(Debug, Deserialize)]
struct SuffixAsset {
    suffixes: SuffixTable,
}

#[derive(Debug, Deserialize)]
struct SuffixTable {
    suffixes: Vec<String>,
}

/// Filename suffixes recognised as source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSuffixes(Vec<String>);

impl SourceSuffixes {
    /// Creates an allow-list from explicit suffixes.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(suffixes.into_iter().map(Into::into).collect())
    }

    /// Returns the allow-list compiled into the binary.
    pub fn embedded() -> Result<Self, AnalysisError> {
        Self::parse(EMBEDDED_SUFFIXES, Path::new("<embedded>"))
    }

    /// Loads an allow-list asset from disk.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path).map_err(|e| AnalysisError::SuffixAsset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Parses a `[suffixes] suffixes = [...]` TOML document.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, AnalysisError> {
        let asset: SuffixAsset = toml::from_str(content).map_err(|e| AnalysisError::SuffixAsset {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self(asset.suffixes.suffixes))
    }

    /// Returns whether `path` ends with one of the suffixes.
    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|suffix| path.ends_with(suffix.as_str()))
    }

    /// Returns the suffixes in asset order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Decides which project files are analyzed.
///
/// A path is ignored when any pattern occurs anywhere in it, regardless of
/// suffix. Otherwise it is included only if it ends with an allow-listed
/// suffix, so everything not recognised as source code is excluded by
/// default. Patterns are plain substrings, not globs.
#[derive(Debug, Clone)]
pub struct IgnorePatternSet {
    patterns: Vec<String>,
    suffixes: SourceSuffixes,
}

impl IgnorePatternSet {
    /// Creates a set holding only the base patterns.
    pub fn new(suffixes: SourceSuffixes) -> Self {
        Self {
            patterns: BASE_PATTERNS.iter().map(|p| (*p).to_string()).collect(),
            suffixes,
        }
    }

    /// Creates a set for a project, reading its ignore file once if present.
    pub fn for_project(project_root: &Path, suffixes: SourceSuffixes) -> Result<Self, AnalysisError> {
        let mut set = Self::new(suffixes);
        let ignore_path = project_root.join(PROJECT_IGNORE_FILE);
        if ignore_path.is_file() {
            let content =
                fs::read_to_string(&ignore_path).map_err(|source| AnalysisError::FileAccess {
                    path: ignore_path.clone(),
                    source,
                })?;
            set.extend_from_ignore_file(&content);
            debug!(
                path = %ignore_path.display(),
                patterns = ?set.patterns,
                "Loaded project ignore patterns"
            );
        }
        Ok(set)
    }

    /// Appends every non-empty, non-comment line of an ignore file, trimmed,
    /// in file order.
    pub fn extend_from_ignore_file(&mut self, content: &str) {
        self.patterns.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    /// Returns the patterns in evaluation order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns whether any pattern occurs in `path`.
    pub fn matches_pattern(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    /// Returns whether `path` should be analyzed.
    pub fn should_include(&self, path: &str) -> bool {
        !self.matches_pattern(path) && self.suffixes.matches(path)
    }
}

/// Renders a project-relative path as a rooted, `/`-separated string.
///
/// `src/main.rs` becomes `/src/main.rs`, which is the form ignore patterns
/// are matched against.
pub fn rooted_path(relative: &Path) -> String {
    let mut rooted = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            rooted.push('/');
            rooted.push_str(&part.to_string_lossy());
        }
    }
    if rooted.is_empty() {
        rooted.push('/');
    }
    rooted
}

/// Returns the path of `path` relative to `root`, or `path` itself.
pub(crate) fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
