//! Analysis pipeline errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the analysis pipeline.
///
/// Everything except [`AnalysisError::FileAccess`] is a configuration
/// problem that aborts the run before the affected analyzer produces any
/// output. File access errors are reported and the file is skipped.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The project directory does not exist or is not a directory.
    #[error("Project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// Resetting the output directory would delete project files: it is the
    /// project, an ancestor of it, or a populated directory inside it that no
    /// earlier run produced.
    #[error("Output directory {} would overwrite the project", .0.display())]
    OutputOverlapsProject(PathBuf),

    /// The analyzer root directory could not be listed.
    #[error("Analyzer directory not found: {}", .0.display())]
    AnalyzerRootMissing(PathBuf),

    /// A stage template file is missing for an analyzer.
    #[error("Stage {stage} template not found for analyzer '{analyzer}' in {}", .dir.display())]
    StageTemplateMissing {
        /// Analyzer name.
        analyzer: String,
        /// Stage number (1 = per-file, 2 = aggregate).
        stage: u8,
        /// Analyzer directory that was searched.
        dir: PathBuf,
    },

    /// A stage template file exists but cannot be parsed.
    #[error("Malformed stage template {}: {reason}", .path.display())]
    MalformedStageTemplate {
        /// Template file path.
        path: PathBuf,
        /// Parser error message.
        reason: String,
    },

    /// The source suffix allow-list asset is missing or malformed.
    #[error("Invalid source suffix asset {}: {reason}", .path.display())]
    SuffixAsset {
        /// Asset path, or `<embedded>` for the built-in list.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    FileAccess {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    /// Returns whether the error is a configuration problem.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::FileAccess { .. })
    }
}
