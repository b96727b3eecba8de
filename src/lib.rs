//! # project-modernizr
//!
//! Templated, multi-analyzer AI analysis of a source tree.
//!
//! Each analyzer is a directory with two prompt templates. Every source file
//! of a project is sent through every analyzer's per-file template, then each
//! analyzer summarizes its own per-file results into one high-level report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use project_modernizr::ai::GenerationClient;
//! use project_modernizr::analysis::{AnalysisConfig, Orchestrator, SourceSuffixes};
//! use project_modernizr::utils::{check_ai_credentials, create_ai_client};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let info = check_ai_credentials(None)?;
//! let client = GenerationClient::new(create_ai_client(&info, 8192)?);
//! let config = AnalysisConfig::new("path/to/project", SourceSuffixes::embedded()?);
//! let report = Orchestrator::new(config, &client).run().await?;
//! println!("{} artifacts", report.artifacts.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ai;
pub mod analysis;
pub mod cli;
pub mod utils;

pub use crate::cli::Cli;

/// The current version of project-modernizr.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
