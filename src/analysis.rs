//! Template-driven, two-stage project analysis.
//!
//! Every qualifying source file is sent to every analyzer (stage 1), then
//! each analyzer summarizes its own per-file results once (stage 2). The
//! [`Orchestrator`] drives the run; the other modules are its leaf pieces.

pub mod analyzer;
pub mod error;
pub mod ignore;
pub mod layout;
pub mod markdown;
pub mod orchestrator;
pub mod template;
pub mod text;
pub mod tree;

pub use analyzer::{AnalyzerDefinition, AnalyzerRegistry, Stage, StageTemplate};
pub use error::AnalysisError;
pub use ignore::{IgnorePatternSet, SourceSuffixes};
pub use layout::OutputLayout;
pub use orchestrator::{
    AnalysisConfig, FailedPair, FailurePolicy, Orchestrator, PairTarget, RunReport, RunState,
};
pub use template::{Placeholder, PromptTemplate};
pub use text::{is_probably_text, FileRecord};
pub use tree::{TreeDocument, TreeRenderer};
