//! End-to-end analysis run.
//!
//! A run moves through [`RunState`] strictly in order:
//!
//! 1. `Init`: load every analyzer template, reset the output directory,
//!    load ignore rules, render and persist the tree.
//! 2. `TreeBuilt`: analyze every (file, analyzer) pair on a bounded pool.
//! 3. `FilesAnalyzed`: aggregate each analyzer's per-file artifacts.
//! 4. `Aggregated`: write the completion marker if nothing failed.
//! 5. `Done`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::analyzer::{AnalyzerDefinition, AnalyzerRegistry, Stage};
use super::ignore::{relative_to, rooted_path, IgnorePatternSet, SourceSuffixes};
use super::layout::OutputLayout;
use super::markdown;
use super::template::Placeholder;
use super::text::{is_probably_text, FileRecord};
use super::tree::{TreeDocument, TreeRenderer};
use super::AnalysisError;
use crate::ai::GenerationClient;

/// Default analyzer root, relative to the working directory.
pub const DEFAULT_ANALYZER_ROOT: &str = "analyzer";

/// Default number of concurrent text-generation requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// What to do when a text-generation request fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Record the failed pair and keep going.
    #[default]
    Continue,
    /// Stop at the first failure.
    Abort,
}

/// Explicit configuration for one run.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// Project directory to analyze.
    pub project_root: PathBuf,
    /// Directory holding one subdirectory per analyzer.
    pub analyzer_root: PathBuf,
    /// Output directory; `results-<project>` in the working directory if unset.
    pub output_dir: Option<PathBuf>,
    /// Source suffix allow-list.
    pub suffixes: SourceSuffixes,
    /// Maximum concurrent text-generation requests.
    pub concurrency: usize,
    /// Handling of text-generation failures.
    pub failure_policy: FailurePolicy,
    /// Suppresses progress output on stdout.
    pub quiet: bool,
}

impl AnalysisConfig {
    /// Creates a configuration with defaults for everything but the project.
    pub fn new(project_root: impl Into<PathBuf>, suffixes: SourceSuffixes) -> Self {
        Self {
            project_root: project_root.into(),
            analyzer_root: PathBuf::from(DEFAULT_ANALYZER_ROOT),
            output_dir: None,
            suffixes,
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            quiet: false,
        }
    }

    /// Sets the analyzer root.
    #[must_use]
    pub fn with_analyzer_root(mut self, analyzer_root: impl Into<PathBuf>) -> Self {
        self.analyzer_root = analyzer_root.into();
        self
    }

    /// Sets an explicit output directory.
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Sets the request concurrency (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Enables or disables progress output.
    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// Run progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Nothing done yet.
    Init,
    /// Output directory reset and tree rendered.
    TreeBuilt,
    /// Every per-file request has finished.
    FilesAnalyzed,
    /// Every aggregate request has finished.
    Aggregated,
    /// Terminal.
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::TreeBuilt => "tree-built",
            Self::FilesAnalyzed => "files-analyzed",
            Self::Aggregated => "aggregated",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a failed request was producing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairTarget {
    /// A per-file artifact for the given relative path.
    File(String),
    /// The analyzer's aggregate artifact.
    Aggregate,
}

impl fmt::Display for PairTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.write_str(path),
            Self::Aggregate => f.write_str("<aggregate>"),
        }
    }
}

/// A request that produced no artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedPair {
    /// File or aggregate.
    pub target: PairTarget,
    /// Analyzer name.
    pub analyzer: String,
    /// Rendered error chain.
    pub error: String,
}

impl fmt::Display for FailedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.target, self.analyzer, self.error)
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Output directory of the run.
    pub output_dir: PathBuf,
    /// Files sent to the analyzers.
    pub files_analyzed: usize,
    /// Included files skipped as binary or unreadable.
    pub files_skipped: usize,
    /// Artifacts written, sorted.
    pub artifacts: Vec<PathBuf>,
    /// Requests that failed under [`FailurePolicy::Continue`].
    pub failures: Vec<FailedPair>,
}

impl RunReport {
    /// Returns whether every request succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Serialize)]
struct CompletionMarker<'a> {
    files_analyzed: usize,
    files_skipped: usize,
    artifacts: usize,
    analyzers: Vec<&'a str>,
}

/// The project being analyzed, with its resolved output layout.
#[derive(Debug)]
struct Project {
    root: PathBuf,
    name: String,
    layout: OutputLayout,
}

impl Project {
    fn resolve(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let not_found = || AnalysisError::ProjectNotFound(config.project_root.clone());
        let root = config
            .project_root
            .canonicalize()
            .map_err(|_| not_found())?;
        if !root.is_dir() {
            return Err(not_found());
        }
        let name = root
            .file_name()
            .map_or_else(|| "root".to_string(), |n| n.to_string_lossy().into_owned());

        let output = config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("results-{name}")));
        let output = resolve_output_dir(&output)?;
        if root.starts_with(&output) {
            return Err(AnalysisError::OutputOverlapsProject(output));
        }
        let layout = OutputLayout::new(output);
        if layout.root().starts_with(&root) && !is_previous_output(&layout) {
            return Err(AnalysisError::OutputOverlapsProject(layout.root().to_path_buf()));
        }

        Ok(Self { root, name, layout })
    }
}

/// Whether a directory inside the project is safe to wipe: absent, empty,
/// or left behind by an earlier run.
fn is_previous_output(layout: &OutputLayout) -> bool {
    match std::fs::read_dir(layout.root()) {
        Ok(mut entries) => {
            entries.next().is_none()
                || layout.tree_path().is_file()
                || layout.completion_marker().is_file()
        }
        Err(_) => !layout.root().exists(),
    }
}

/// Makes `path` absolute, resolving symlinks in whatever part exists.
fn resolve_output_dir(path: &Path) -> Result<PathBuf, AnalysisError> {
    let absolute = std::path::absolute(path).map_err(|source| AnalysisError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok(parent
            .canonicalize()
            .map_or_else(|_| absolute.clone(), |p| p.join(name))),
        _ => Ok(absolute),
    }
}

#[derive(Clone, Copy)]
enum JobInput<'j> {
    File(&'j FileRecord),
    Aggregate(&'j str),
}

/// One text-generation request and the artifact it produces.
struct Job<'j> {
    analyzer: &'j AnalyzerDefinition,
    input: JobInput<'j>,
    output: PathBuf,
}

impl Job<'_> {
    fn stage(&self) -> Stage {
        match self.input {
            JobInput::File(_) => Stage::PerFile,
            JobInput::Aggregate(_) => Stage::Aggregate,
        }
    }

    fn target(&self) -> PairTarget {
        match self.input {
            JobInput::File(record) => PairTarget::File(record.display_path()),
            JobInput::Aggregate(_) => PairTarget::Aggregate,
        }
    }

    fn user_prompt(&self, tree: &TreeDocument) -> String {
        let template = &self.analyzer.stage(self.stage()).user_template;
        match self.input {
            JobInput::File(record) => {
                let relative = record.display_path();
                template.render(&[
                    (Placeholder::Content, record.content.as_str()),
                    (Placeholder::TreeStructure, tree.as_str()),
                    (Placeholder::RelativePath, relative.as_str()),
                ])
            }
            JobInput::Aggregate(content) => template.render(&[
                (Placeholder::Content, content),
                (Placeholder::TreeStructure, tree.as_str()),
            ]),
        }
    }
}

enum JobOutcome {
    Written(PathBuf),
    Failed(FailedPair, anyhow::Error),
    Cancelled,
}

/// Drives a run against a text-generation client.
pub struct Orchestrator<'a> {
    config: AnalysisConfig,
    client: &'a GenerationClient,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator in [`RunState::Init`].
    pub fn new(config: AnalysisConfig, client: &'a GenerationClient) -> Self {
        Self {
            config,
            client,
            state: RunState::Init,
        }
    }

    /// Returns the current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "Run state transition");
        self.state = next;
    }

    /// Runs the whole pipeline.
    ///
    /// Configuration errors are returned before the output directory is
    /// touched. Text-generation failures are recorded in the report, or
    /// returned immediately under [`FailurePolicy::Abort`].
    pub async fn run(&mut self) -> Result<RunReport> {
        let project = Project::resolve(&self.config)?;
        let registry = AnalyzerRegistry::load(&self.config.analyzer_root)?;
        if registry.is_empty() {
            warn!(root = %self.config.analyzer_root.display(), "No analyzers found");
        }
        info!(
            project = %project.root.display(),
            output = %project.layout.root().display(),
            analyzers = registry.len(),
            "Starting analysis"
        );
        self.progress(format_args!("Analyze project {}", project.root.display()));

        let layout = &project.layout;
        layout.reset()?;
        let ignore = IgnorePatternSet::for_project(&project.root, self.config.suffixes.clone())?;
        self.progress(format_args!("Generate tree structure"));
        let tree = TreeRenderer::new()
            .exclude(layout.root())
            .render(&project.root)?;
        tree.persist(&layout.tree_path())?;
        self.advance(RunState::TreeBuilt);

        let (files, files_skipped) = self.collect_files(&project.root, layout.root(), &ignore);
        let mut report = RunReport {
            output_dir: layout.root().to_path_buf(),
            files_analyzed: files.len(),
            files_skipped,
            ..RunReport::default()
        };

        let jobs: Vec<Job<'_>> = files
            .iter()
            .flat_map(|record| {
                registry.analyzers().iter().map(move |analyzer| Job {
                    analyzer,
                    input: JobInput::File(record),
                    output: layout.file_artifact(&record.display_path(), &analyzer.name),
                })
            })
            .collect();
        self.progress(format_args!(
            "🔍 Analyzing {} file(s) of {} with {} analyzer(s)...",
            files.len(),
            project.name,
            registry.len()
        ));
        let outcomes = self.run_jobs(&jobs, &tree, layout).await?;
        self.absorb(&mut report, outcomes)?;
        self.advance(RunState::FilesAnalyzed);

        let inputs = layout.collect_aggregate_inputs(&registry.names())?;
        let jobs: Vec<Job<'_>> = registry
            .analyzers()
            .iter()
            .map(|analyzer| Job {
                analyzer,
                input: JobInput::Aggregate(inputs.get(&analyzer.name).map_or("", String::as_str)),
                output: layout.aggregate_artifact(&analyzer.name),
            })
            .collect();
        self.progress(format_args!("📝 Writing high level analysis..."));
        let outcomes = self.run_jobs(&jobs, &tree, layout).await?;
        self.absorb(&mut report, outcomes)?;
        self.advance(RunState::Aggregated);

        report.artifacts.sort();
        if report.is_complete() {
            let marker = CompletionMarker {
                files_analyzed: report.files_analyzed,
                files_skipped: report.files_skipped,
                artifacts: report.artifacts.len(),
                analyzers: registry.names(),
            };
            let text = toml::to_string(&marker).context("Failed to serialize completion marker")?;
            layout.write(&layout.completion_marker(), &text)?;
        }
        self.advance(RunState::Done);
        info!(
            files = report.files_analyzed,
            artifacts = report.artifacts.len(),
            failures = report.failures.len(),
            "Analysis finished"
        );
        Ok(report)
    }

    /// Walks the project in lexicographic order and materializes every
    /// included text file. Returns the files and the number skipped.
    fn collect_files(
        &self,
        root: &Path,
        output_root: &Path,
        ignore: &IgnorePatternSet,
    ) -> (Vec<FileRecord>, usize) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                if entry.path().starts_with(output_root) {
                    return false;
                }
                !entry.file_type().is_dir()
                    || !ignore.matches_pattern(&rooted_path(&relative_to(entry.path(), root)))
            });

        let mut files = Vec::new();
        let mut skipped = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {e}");
                    continue;
                }
            };
            if entry.file_type().is_dir() || !entry.path().is_file() {
                continue;
            }

            let relative = relative_to(entry.path(), root);
            let rooted = rooted_path(&relative);
            if !ignore.should_include(&rooted) {
                debug!(path = %rooted, "Skipping file based on ignore rules");
                continue;
            }
            if !is_probably_text(entry.path()) {
                warn!(path = %entry.path().display(), "Skipping binary or non-text file");
                skipped += 1;
                continue;
            }
            match FileRecord::read(entry.path().to_path_buf(), relative) {
                Ok(record) => files.push(record),
                Err(e) => {
                    warn!("Skipping file: {e}");
                    skipped += 1;
                }
            }
        }
        debug!(files = files.len(), skipped, "Collected project files");
        (files, skipped)
    }

    /// Runs jobs with at most `concurrency` requests in flight.
    ///
    /// Outcomes are returned in job order. Under [`FailurePolicy::Abort`]
    /// jobs that have not started when the first failure lands are
    /// cancelled. Output write failures are returned as errors.
    async fn run_jobs(
        &self,
        jobs: &[Job<'_>],
        tree: &TreeDocument,
        layout: &OutputLayout,
    ) -> Result<Vec<JobOutcome>> {
        let semaphore = Semaphore::new(self.config.concurrency.max(1));
        let completed = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);
        let total = jobs.len();

        let futs = jobs.iter().map(|job| {
            let semaphore = &semaphore;
            let completed = &completed;
            let aborted = &aborted;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| anyhow::anyhow!("semaphore closed: {e}"))?;
                if aborted.load(Ordering::Relaxed) {
                    return Ok(JobOutcome::Cancelled);
                }

                let stage = job.analyzer.stage(job.stage());
                let user_prompt = job.user_prompt(tree);
                let result = self
                    .client
                    .generate(&stage.system_prompt, &user_prompt)
                    .await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                match result {
                    Ok(text) => {
                        layout.write(&job.output, &markdown::normalize(&text))?;
                        self.progress(format_args!(
                            "   ✅ {done}/{total} wrote {}",
                            job.output.display()
                        ));
                        Ok::<_, anyhow::Error>(JobOutcome::Written(job.output.clone()))
                    }
                    Err(e) => {
                        if self.config.failure_policy == FailurePolicy::Abort {
                            aborted.store(true, Ordering::Relaxed);
                        }
                        let failed = FailedPair {
                            target: job.target(),
                            analyzer: job.analyzer.name.clone(),
                            error: format!("{e:#}"),
                        };
                        warn!(
                            analyzer = %failed.analyzer,
                            target = %failed.target,
                            "Text generation failed: {e:#}"
                        );
                        self.progress(format_args!(
                            "   ❌ {done}/{total} {} with {} analyzer failed",
                            failed.target, failed.analyzer
                        ));
                        Ok(JobOutcome::Failed(failed, e))
                    }
                }
            }
        });

        futures::future::join_all(futs).await.into_iter().collect()
    }

    /// Folds job outcomes into the report, enforcing the failure policy.
    fn absorb(&self, report: &mut RunReport, outcomes: Vec<JobOutcome>) -> Result<()> {
        for outcome in outcomes {
            match outcome {
                JobOutcome::Written(path) => report.artifacts.push(path),
                JobOutcome::Failed(failed, e) => {
                    if self.config.failure_policy == FailurePolicy::Abort {
                        return Err(e.context(format!(
                            "Text generation failed for {} with analyzer '{}'",
                            failed.target, failed.analyzer
                        )));
                    }
                    report.failures.push(failed);
                }
                JobOutcome::Cancelled => {}
            }
        }
        Ok(())
    }

    fn progress(&self, message: fmt::Arguments<'_>) {
        if !self.config.quiet {
            println!("{message}");
        }
    }
}
