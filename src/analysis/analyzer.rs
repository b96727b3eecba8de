//! Analyzer discovery and stage template loading.
//!
//! An analyzer is a directory under the analyzer root. Its base name is the
//! analyzer name, and it supplies one template file per stage:
//!
//! ```toml
//! # analyzer/security/stage1.toml
//! [system]
//! content = "You are a security reviewer."
//!
//! [user]
//! content = "Review {relative_path}:\n{content}"
//! ```
//!
//! `stage<N>.yaml` (or `.yml`) with the same `system.content` and
//! `user.content` keys is accepted when no TOML file exists.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::template::PromptTemplate;
use super::AnalysisError;

/// Template file extensions, in lookup order.
const TEMPLATE_EXTENSIONS: &[&str] = &["toml", "yaml", "yml"];

/// The two analysis passes every analyzer defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// One request per (file, analyzer) pair.
    PerFile,
    /// One request per analyzer over all of its per-file artifacts.
    Aggregate,
}

impl Stage {
    /// Returns the stage number used in template file names.
    pub fn number(self) -> u8 {
        match self {
            Self::PerFile => 1,
            Self::Aggregate => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage{}", self.number())
    }
}

#[derive(Debug, Default, Deserialize)]
struct StageFile {
    #[serde(default)]
    system: PromptSection,
    #[serde(default)]
    user: PromptSection,
}

#[derive(Debug, Default, Deserialize)]
struct PromptSection {
    #[serde(default)]
    content: String,
}

/// System prompt and user prompt template for one stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageTemplate {
    /// System prompt sent verbatim.
    pub system_prompt: String,
    /// User prompt with placeholders.
    pub user_template: PromptTemplate,
}

impl StageTemplate {
    /// Loads the template for `stage` from an analyzer directory.
    ///
    /// Missing `system` or `user` keys default to empty strings. A missing
    /// template file is a configuration error.
    pub fn load(analyzer_dir: &Path, stage: Stage) -> Result<Self, AnalysisError> {
        let Some(path) = find_template_file(analyzer_dir, stage) else {
            return Err(AnalysisError::StageTemplateMissing {
                analyzer: analyzer_name(analyzer_dir),
                stage: stage.number(),
                dir: analyzer_dir.to_path_buf(),
            });
        };

        let content = fs::read_to_string(&path).map_err(|source| AnalysisError::FileAccess {
            path: path.clone(),
            source,
        })?;
        let parsed = parse_stage_file(&path, &content)?;
        debug!(path = %path.display(), "Loaded stage template");

        Ok(Self {
            system_prompt: parsed.system.content,
            user_template: PromptTemplate::new(parsed.user.content),
        })
    }
}

fn find_template_file(analyzer_dir: &Path, stage: Stage) -> Option<PathBuf> {
    TEMPLATE_EXTENSIONS
        .iter()
        .map(|ext| analyzer_dir.join(format!("{stage}.{ext}")))
        .find(|path| path.is_file())
}

fn parse_stage_file(path: &Path, content: &str) -> Result<StageFile, AnalysisError> {
    let malformed = |reason: String| AnalysisError::MalformedStageTemplate {
        path: path.to_path_buf(),
        reason,
    };
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        toml::from_str(content).map_err(|e| malformed(e.to_string()))
    } else if content.trim().is_empty() {
        Ok(StageFile::default())
    } else {
        serde_yaml::from_str(content).map_err(|e| malformed(e.to_string()))
    }
}

fn analyzer_name(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// A named pair of stage templates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerDefinition {
    /// Analyzer name, taken from its directory.
    pub name: String,
    /// Directory the templates were loaded from.
    pub dir: PathBuf,
    /// Stage 1 template.
    pub per_file: StageTemplate,
    /// Stage 2 template.
    pub aggregate: StageTemplate,
}

impl AnalyzerDefinition {
    /// Loads both stage templates from `dir`.
    pub fn load(dir: &Path) -> Result<Self, AnalysisError> {
        Ok(Self {
            name: analyzer_name(dir),
            dir: dir.to_path_buf(),
            per_file: StageTemplate::load(dir, Stage::PerFile)?,
            aggregate: StageTemplate::load(dir, Stage::Aggregate)?,
        })
    }

    /// Returns the template for `stage`.
    pub fn stage(&self, stage: Stage) -> &StageTemplate {
        match stage {
            Stage::PerFile => &self.per_file,
            Stage::Aggregate => &self.aggregate,
        }
    }
}

/// Lists analyzer directories under `root`, sorted by name.
///
/// Non-directory entries are ignored. Discovery never reads templates, so a
/// broken analyzer is still discovered.
pub fn discover_analyzer_dirs(root: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    let entries = fs::read_dir(root).map_err(|_| AnalysisError::AnalyzerRootMissing(root.to_path_buf()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| AnalysisError::FileAccess {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// The analyzers taking part in a run.
#[derive(Clone, Debug, Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<AnalyzerDefinition>,
}

impl AnalyzerRegistry {
    /// Discovers and loads every analyzer under `root`.
    ///
    /// Fails on the first analyzer whose templates are missing or malformed.
    pub fn load(root: &Path) -> Result<Self, AnalysisError> {
        let analyzers = discover_analyzer_dirs(root)?
            .iter()
            .map(|dir| AnalyzerDefinition::load(dir))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            root = %root.display(),
            analyzers = ?analyzers.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            "Discovered analyzers"
        );
        Ok(Self { analyzers })
    }

    /// Returns the analyzers in run order.
    pub fn analyzers(&self) -> &[AnalyzerDefinition] {
        &self.analyzers
    }

    /// Returns the analyzer names in run order.
    pub fn names(&self) -> Vec<&str> {
        self.analyzers.iter().map(|a| a.name.as_str()).collect()
    }

    /// Returns whether no analyzers were found.
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Returns the number of analyzers.
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write_analyzer(root: &Path, name: &str, stage1: &str, stage2: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stage1.toml"), stage1).unwrap();
        fs::write(dir.join("stage2.toml"), stage2).unwrap();
        dir
    }

    #[test]
    fn loads_system_and_user_content() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_analyzer(
            root.path(),
            "security",
            "[system]\ncontent = \"sys1\"\n[user]\ncontent = \"Review {relative_path}\"\n",
            "[system]\ncontent = \"sys2\"\n[user]\ncontent = \"{content}\"\n",
        );

        let def = AnalyzerDefinition::load(&dir).unwrap();
        assert_eq!(def.name, "security");
        assert_eq!(def.per_file.system_prompt, "sys1");
        assert_eq!(def.per_file.user_template.as_str(), "Review {relative_path}");
        assert_eq!(def.stage(Stage::Aggregate).system_prompt, "sys2");
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_analyzer(root.path(), "sparse", "[user]\ncontent = \"u\"\n", "");

        let def = AnalyzerDefinition::load(&dir).unwrap();
        assert_eq!(def.per_file.system_prompt, "");
        assert_eq!(def.per_file.user_template.as_str(), "u");
        assert_eq!(def.aggregate, StageTemplate::default());
    }

    #[test]
    fn missing_stage_file_is_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("half");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stage1.toml"), "").unwrap();

        let err = AnalyzerDefinition::load(&dir).unwrap_err();
        match &err {
            AnalysisError::StageTemplateMissing {
                analyzer, stage, ..
            } => {
                assert_eq!(analyzer, "half");
                assert_eq!(*stage, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_configuration());
    }

    #[test]
    fn malformed_toml_is_reported_with_path() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_analyzer(root.path(), "broken", "[system\ncontent=", "");

        let err = AnalyzerDefinition::load(&dir).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedStageTemplate { ref path, .. }
            if path.ends_with("stage1.toml")));
    }

    #[test]
    fn yaml_template_is_accepted() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("style");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("stage1.yaml"),
            "system:\n  content: be brief\nuser:\n  content: \"{content}\"\n",
        )
        .unwrap();
        fs::write(dir.join("stage2.yml"), "user:\n  content: summary\n").unwrap();

        let def = AnalyzerDefinition::load(&dir).unwrap();
        assert_eq!(def.per_file.system_prompt, "be brief");
        assert_eq!(def.per_file.user_template.as_str(), "{content}");
        assert_eq!(def.aggregate.user_template.as_str(), "summary");
    }

    #[test]
    fn toml_takes_precedence_over_yaml() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_analyzer(root.path(), "both", "[user]\ncontent = \"toml\"\n", "");
        fs::write(dir.join("stage1.yaml"), "user:\n  content: yaml\n").unwrap();

        let template = StageTemplate::load(&dir, Stage::PerFile).unwrap();
        assert_eq!(template.user_template.as_str(), "toml");
    }

    #[test]
    fn discovery_ignores_files_and_sorts_by_name() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("zeta")).unwrap();
        fs::create_dir_all(root.path().join("alpha")).unwrap();
        fs::write(root.path().join("README.md"), "not an analyzer").unwrap();

        let dirs = discover_analyzer_dirs(root.path()).unwrap();
        let names: Vec<_> = dirs.iter().map(|d| analyzer_name(d)).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn discovery_does_not_read_templates() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("empty")).unwrap();
        assert_eq!(discover_analyzer_dirs(root.path()).unwrap().len(), 1);
        assert!(AnalyzerRegistry::load(root.path()).is_err());
    }

    #[test]
    fn missing_analyzer_root_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let err = discover_analyzer_dirs(&root.path().join("analyzer")).unwrap_err();
        assert!(matches!(err, AnalysisError::AnalyzerRootMissing(_)));
    }

    #[test]
    fn registry_loads_all_analyzers_in_order() {
        let root = tempfile::tempdir().unwrap();
        write_analyzer(root.path(), "b", "", "");
        write_analyzer(root.path(), "a", "", "");

        let registry = AnalyzerRegistry::load(root.path()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn stage_display_matches_file_stem() {
        assert_eq!(Stage::PerFile.to_string(), "stage1");
        assert_eq!(Stage::Aggregate.to_string(), "stage2");
    }
}
