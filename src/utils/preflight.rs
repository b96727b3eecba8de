//! Preflight validation checks for early failure detection
//!
//! Provider credentials are resolved before the output directory is touched,
//! so a missing key fails the run with a clear message instead of after the
//! first file has been read.

use std::fmt;

use anyhow::{anyhow, Result};

use crate::ai::{AiClient, BedrockAiClient, ClaudeAiClient, OpenAiAiClient};
use crate::utils::settings::Settings;

const DEFAULT_CLAUDE_MODEL: &str = "claude-opus-4-1-20250805";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_OLLAMA_MODEL: &str = "llama2";

/// AI provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    /// Anthropic Claude API
    Claude,
    /// AWS Bedrock with Claude
    Bedrock,
    /// OpenAI API
    OpenAi,
    /// Local Ollama
    Ollama,
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claude => write!(f, "Claude API"),
            Self::Bedrock => write!(f, "AWS Bedrock"),
            Self::OpenAi => write!(f, "OpenAI API"),
            Self::Ollama => write!(f, "Ollama"),
        }
    }
}

/// Result of AI credential validation
///
/// Carries the resolved credentials so the client can be built without
/// reading the environment a second time.
pub struct AiCredentialInfo {
    /// The AI provider that will be used
    pub provider: AiProvider,
    /// The model that will be used
    pub model: String,
    secret: Option<String>,
    base_url: Option<String>,
}

impl fmt::Debug for AiCredentialInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiCredentialInfo")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Validate AI credentials are available before processing
///
/// Each variable is read from the environment first and from
/// `$HOME/.modernizr/settings.json` second. `model_override` wins over any
/// configured model.
pub fn check_ai_credentials(model_override: Option<&str>) -> Result<AiCredentialInfo> {
    let settings = Settings::load()?;
    resolve_credentials(|key| settings.get_env_var(key), model_override)
}

fn resolve_credentials(
    lookup: impl Fn(&str) -> Option<String>,
    model_override: Option<&str>,
) -> Result<AiCredentialInfo> {
    let flag = |key: &str| lookup(key).is_some_and(|val| val == "true");
    let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(*key));
    let model = |key: &str, default: &str| {
        model_override
            .map(String::from)
            .or_else(|| lookup(key))
            .unwrap_or_else(|| default.to_string())
    };

    // Ollama needs no credentials, just a model
    if flag("USE_OLLAMA") {
        return Ok(AiCredentialInfo {
            provider: AiProvider::Ollama,
            model: model("OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
            secret: None,
            base_url: lookup("OLLAMA_BASE_URL"),
        });
    }

    if flag("USE_OPENAI") {
        let key = first(&["OPENAI_API_KEY", "OPENAI_AUTH_TOKEN"]).ok_or_else(|| {
            anyhow!(
                "OpenAI API key not found.\n\
                 Set one of these environment variables:\n\
                 - OPENAI_API_KEY\n\
                 - OPENAI_AUTH_TOKEN"
            )
        })?;
        return Ok(AiCredentialInfo {
            provider: AiProvider::OpenAi,
            model: model("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            secret: Some(key),
            base_url: None,
        });
    }

    if flag("CLAUDE_CODE_USE_BEDROCK") {
        let token = lookup("ANTHROPIC_AUTH_TOKEN").ok_or_else(|| {
            anyhow!(
                "AWS Bedrock authentication not configured.\n\
                 Set ANTHROPIC_AUTH_TOKEN environment variable."
            )
        })?;
        let base_url = lookup("ANTHROPIC_BEDROCK_BASE_URL").ok_or_else(|| {
            anyhow!(
                "AWS Bedrock base URL not configured.\n\
                 Set ANTHROPIC_BEDROCK_BASE_URL environment variable."
            )
        })?;
        return Ok(AiCredentialInfo {
            provider: AiProvider::Bedrock,
            model: model("ANTHROPIC_MODEL", DEFAULT_CLAUDE_MODEL),
            secret: Some(token),
            base_url: Some(base_url),
        });
    }

    let key = first(&["CLAUDE_API_KEY", "ANTHROPIC_API_KEY", "ANTHROPIC_AUTH_TOKEN"]).ok_or_else(
        || {
            anyhow!(
                "Claude API key not found.\n\
                 Set one of these environment variables:\n\
                 - CLAUDE_API_KEY\n\
                 - ANTHROPIC_API_KEY\n\
                 - ANTHROPIC_AUTH_TOKEN"
            )
        },
    )?;
    Ok(AiCredentialInfo {
        provider: AiProvider::Claude,
        model: model("ANTHROPIC_MODEL", DEFAULT_CLAUDE_MODEL),
        secret: Some(key),
        base_url: None,
    })
}

/// Builds the provider client described by validated credentials.
pub fn create_ai_client(info: &AiCredentialInfo, max_tokens: i32) -> Result<Box<dyn AiClient>> {
    let model = info.model.clone();
    let secret = || {
        info.secret
            .clone()
            .ok_or_else(|| anyhow!("No credentials resolved for {}", info.provider))
    };

    let client: Box<dyn AiClient> = match info.provider {
        AiProvider::Ollama => Box::new(OpenAiAiClient::ollama(
            model,
            info.base_url.clone(),
            max_tokens,
        )?),
        AiProvider::OpenAi => Box::new(OpenAiAiClient::openai(model, secret()?, max_tokens)?),
        AiProvider::Bedrock => {
            let base_url = info
                .base_url
                .clone()
                .ok_or_else(|| anyhow!("No Bedrock base URL resolved"))?;
            Box::new(BedrockAiClient::new(model, secret()?, base_url, max_tokens)?)
        }
        AiProvider::Claude => Box::new(ClaudeAiClient::new(model, secret()?, max_tokens)?),
    };
    Ok(client)
}
