use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use project_modernizr::ai::{
    AiClient, AiClientMetadata, ClaudeAiClient, GenerationClient, RequestLog, RetryPolicy,
    ServiceError,
};
use project_modernizr::analysis::{
    AnalysisConfig, FailurePolicy, Orchestrator, PairTarget, RunState, SourceSuffixes,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scratch project, analyzer root and output directory.
struct TestProject {
    _temp_dir: TempDir,
    project: PathBuf,
    analyzers: PathBuf,
    output: PathBuf,
}

impl TestProject {
    fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let project = temp_dir.path().join("legacy-app");
        let analyzers = temp_dir.path().join("analyzer");
        let output = temp_dir.path().join("results-legacy-app");
        fs::create_dir_all(&project)?;
        fs::create_dir_all(&analyzers)?;

        Ok(Self {
            _temp_dir: temp_dir,
            project,
            analyzers,
            output,
        })
    }

    fn add_file(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.project.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn add_analyzer(&self, name: &str, stage1: &str, stage2: &str) -> Result<()> {
        let dir = self.analyzers.join(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("stage1.toml"), stage1)?;
        fs::write(dir.join("stage2.toml"), stage2)?;
        Ok(())
    }

    fn config(&self) -> AnalysisConfig {
        AnalysisConfig::new(&self.project, SourceSuffixes::new([".py", ".ext"]))
            .with_analyzer_root(&self.analyzers)
            .with_output_dir(&self.output)
            .with_quiet(true)
    }

    fn output_file(&self, relative: &str) -> PathBuf {
        self.output.join(relative)
    }
}

/// Provider stand-in that answers with a summary of the prompt it received
/// and can be told to fail a number of times first.
struct ScriptedClient {
    transient_failures: AtomicUsize,
    requests: Arc<AtomicUsize>,
}

impl ScriptedClient {
    fn new(transient_failures: usize) -> (Self, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let client = Self {
            transient_failures: AtomicUsize::new(transient_failures),
            requests: requests.clone(),
        };
        (client, requests)
    }
}

impl AiClient for ScriptedClient {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ServiceError::RateLimitExceeded.into());
            }
            Ok(format!("# {system_prompt}\n{user_prompt}"))
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        AiClientMetadata {
            provider: "Scripted".to_string(),
            model: "scripted-1".to_string(),
            max_response_length: 1024,
        }
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn security_analyzer(project: &TestProject) -> Result<()> {
    project.add_analyzer(
        "security",
        "[system]\ncontent = \"Security review\"\n[user]\ncontent = \"File {relative_path}: {content}\"\n",
        "[system]\ncontent = \"Security summary\"\n[user]\ncontent = \"{content}\"\n",
    )
}

#[tokio::test]
async fn full_run_writes_every_artifact() -> Result<()> {
    let project = TestProject::new()?;
    project.add_file("app/main.py", "print('hi')")?;
    project.add_file("app/util.py", "def f(): pass")?;
    project.add_file("docs/notes.txt", "not source")?;
    security_analyzer(&project)?;

    let (ai, requests) = ScriptedClient::new(0);
    let client = GenerationClient::new(Box::new(ai)).with_retry_policy(fast_retry(0));
    let mut orchestrator = Orchestrator::new(project.config(), &client);
    let report = orchestrator.run().await?;

    assert_eq!(orchestrator.state(), RunState::Done);
    assert!(report.is_complete());
    assert_eq!(report.files_analyzed, 2);
    assert_eq!(requests.load(Ordering::SeqCst), 3);

    let main = fs::read_to_string(project.output_file("app/main.py-security.md"))?;
    assert_eq!(main, "\n# Security review\n\nFile app/main.py: print('hi')");
    assert!(!project.output_file("docs/notes.txt-security.md").exists());

    let summary = fs::read_to_string(project.output_file("high_level_analysis_security.md"))?;
    assert!(summary.starts_with("\n# Security summary\n"));
    let main_pos = summary.find("Filename: app/main.py").unwrap();
    let util_pos = summary.find("Filename: app/util.py").unwrap();
    assert!(main_pos < util_pos);

    let tree = fs::read_to_string(project.output_file("tree.txt"))?;
    assert!(tree.starts_with("legacy-app/\n"));
    assert!(tree.contains("docs"));
    assert!(project.output_file(".analysis-complete").is_file());
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried() -> Result<()> {
    let project = TestProject::new()?;
    project.add_file("main.py", "x = 1")?;
    security_analyzer(&project)?;

    let (ai, requests) = ScriptedClient::new(2);
    let client = GenerationClient::new(Box::new(ai)).with_retry_policy(fast_retry(3));
    let report = Orchestrator::new(project.config().with_concurrency(1), &client)
        .run()
        .await?;

    assert!(report.is_complete());
    assert_eq!(requests.load(Ordering::SeqCst), 4);
    assert!(project.output_file("main.py-security.md").exists());
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_leave_partial_run() -> Result<()> {
    let project = TestProject::new()?;
    project.add_file("main.py", "x = 1")?;
    security_analyzer(&project)?;

    let (ai, _requests) = ScriptedClient::new(1);
    let client = GenerationClient::new(Box::new(ai)).with_retry_policy(fast_retry(0));
    let report = Orchestrator::new(project.config().with_concurrency(1), &client)
        .run()
        .await?;

    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, PairTarget::File("main.py".to_string()));
    assert!(report.failures[0].error.contains("Rate limit"));
    assert!(!project.output_file(".analysis-complete").exists());
    Ok(())
}

#[tokio::test]
async fn abort_policy_returns_the_service_error() -> Result<()> {
    let project = TestProject::new()?;
    project.add_file("main.py", "x = 1")?;
    security_analyzer(&project)?;

    let (ai, _requests) = ScriptedClient::new(1);
    let client = GenerationClient::new(Box::new(ai)).with_retry_policy(fast_retry(0));
    let config = project
        .config()
        .with_failure_policy(FailurePolicy::Abort);
    let err = Orchestrator::new(config, &client).run().await.unwrap_err();

    assert!(err
        .chain()
        .any(|cause| cause.downcast_ref::<ServiceError>().is_some()));
    Ok(())
}

#[tokio::test]
async fn claude_provider_drives_a_run() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"type": "text", "text": "## Findings\nNothing to report."}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let project = TestProject::new()?;
    project.add_file("src/main.ext", "main")?;
    security_analyzer(&project)?;
    let log_path = project.output.with_extension("log");

    let provider = ClaudeAiClient::with_base_url(
        "claude-test".to_string(),
        "test-key".to_string(),
        server.uri(),
        1024,
    )?;
    let client = GenerationClient::new(Box::new(provider))
        .with_retry_policy(fast_retry(0))
        .with_request_log(RequestLog::new(&log_path));
    Orchestrator::new(project.config(), &client).run().await?;

    let artifact = fs::read_to_string(project.output_file("src/main.ext-security.md"))?;
    assert_eq!(artifact, "\n## Findings\n\nNothing to report.");

    let log = fs::read_to_string(&log_path)?;
    assert_eq!(log.matches("\"model\": \"claude-test\"").count(), 2);
    assert!(log.contains("File src/main.ext: main"));
    Ok(())
}

#[tokio::test]
async fn stale_output_is_removed() -> Result<()> {
    let project = TestProject::new()?;
    project.add_file("main.py", "x = 1")?;
    security_analyzer(&project)?;
    fs::create_dir_all(&project.output)?;
    fs::write(project.output_file("old.py-security.md"), "stale")?;

    let (ai, _requests) = ScriptedClient::new(0);
    let client = GenerationClient::new(Box::new(ai));
    Orchestrator::new(project.config(), &client).run().await?;

    assert!(!project.output_file("old.py-security.md").exists());
    let summary = fs::read_to_string(project.output_file("high_level_analysis_security.md"))?;
    assert!(!summary.contains("stale"));
    Ok(())
}

#[test]
fn embedded_suffixes_cover_common_languages() -> Result<()> {
    let suffixes = SourceSuffixes::embedded()?;
    for sample in ["/a.rs", "/b.py", "/c.java", "/d.ts", "/Makefile"] {
        assert!(suffixes.matches(sample), "{sample} should be source");
    }
    assert!(!suffixes.matches("/image.png"));
    Ok(())
}
