//! CLI interface for modernizr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::ai::{GenerationClient, RequestLog, RetryPolicy, DEFAULT_MAX_TOKENS};
use crate::analysis::orchestrator::{DEFAULT_ANALYZER_ROOT, DEFAULT_CONCURRENCY};
use crate::analysis::{AnalysisConfig, FailurePolicy, Orchestrator, RunReport, SourceSuffixes};
use crate::utils::{check_ai_credentials, create_ai_client};

/// Process exit code for a run that finished with failed requests.
pub const EXIT_PARTIAL: i32 = 2;

/// modernizr: templated, multi-analyzer AI analysis of a source tree.
#[derive(Parser)]
#[command(name = "modernizr")]
#[command(about = "Analyzes a project with every analyzer and summarizes the results", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the project directory.
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Directory holding one subdirectory per analyzer.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_ANALYZER_ROOT)]
    pub analyzers: PathBuf,

    /// Source suffix allow-list (TOML); the built-in list is used if unset.
    #[arg(long, value_name = "FILE")]
    pub suffixes: Option<PathBuf>,

    /// Output directory (defaults to results-<project name>).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// AI model to use (overrides environment configuration).
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum number of concurrent AI requests.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// What to do when an AI request fails.
    #[arg(long, value_enum, default_value_t = FailurePolicy::Continue)]
    pub on_service_error: FailurePolicy,

    /// Retries for transient AI failures (network, rate limit, 5xx).
    #[arg(long, default_value_t = RetryPolicy::default().max_retries)]
    pub max_retries: u32,

    /// Maximum response tokens per request.
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: i32,

    /// Appends every request as JSON to this file (off by default).
    #[arg(long, value_name = "FILE")]
    pub request_log: Option<PathBuf>,

    /// Suppresses progress output.
    #[arg(long)]
    pub quiet: bool,
}

impl Cli {
    /// Executes the analysis and returns its report.
    ///
    /// Failed requests are printed to stderr; the caller decides the exit
    /// code from [`RunReport::is_complete`].
    pub async fn execute(self) -> Result<RunReport> {
        let suffixes = match &self.suffixes {
            Some(path) => SourceSuffixes::load(path)?,
            None => SourceSuffixes::embedded()?,
        };

        let ai_info = check_ai_credentials(self.model.as_deref())?;
        if !self.quiet {
            println!(
                "Connected to {} (model: {})",
                ai_info.provider, ai_info.model
            );
        }
        let ai_client = create_ai_client(&ai_info, self.max_tokens)
            .with_context(|| format!("Failed to create {} client", ai_info.provider))?;

        let mut client = GenerationClient::new(ai_client).with_retry_policy(RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        });
        if let Some(path) = &self.request_log {
            client = client.with_request_log(RequestLog::new(path));
        }

        let mut config = AnalysisConfig::new(&self.project_path, suffixes)
            .with_analyzer_root(&self.analyzers)
            .with_concurrency(self.concurrency)
            .with_failure_policy(self.on_service_error)
            .with_quiet(self.quiet);
        if let Some(output_dir) = &self.output_dir {
            config = config.with_output_dir(output_dir);
        }

        let report = Orchestrator::new(config, &client)
            .run()
            .await
            .with_context(|| format!("Failed to analyze {}", self.project_path.display()))?;

        if report.is_complete() {
            if !self.quiet {
                println!(
                    "\n✅ Analyzed {} file(s), wrote {} artifact(s) to {}",
                    report.files_analyzed,
                    report.artifacts.len(),
                    report.output_dir.display()
                );
            }
        } else {
            eprintln!(
                "\n⚠️  {} request(s) failed; results in {} are partial:",
                report.failures.len(),
                report.output_dir.display()
            );
            for failed in &report.failures {
                eprintln!("  - {failed}");
            }
        }
        Ok(report)
    }
}
