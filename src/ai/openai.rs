//! Chat-completions provider for OpenAI and OpenAI-compatible servers
//! such as Ollama.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AiClient, AiClientMetadata, ServiceError};

/// Default endpoint for the OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default endpoint for a local Ollama instance.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Low temperature keeps repeated analyses of the same file stable.
const ANALYSIS_TEMPERATURE: f32 = 0.1;

/// Which server sits behind the chat-completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFlavor {
    /// api.openai.com or a compatible hosted gateway.
    OpenAi,
    /// A local Ollama server; no credential.
    Ollama,
}

impl fmt::Display for ChatFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI"),
            Self::Ollama => write!(f, "Ollama"),
        }
    }
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    /// Reasoning-series models reject `max_tokens` and a custom temperature.
    fn new(model: &'a str, max_tokens: i32, system: &'a str, user: &'a str) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        let reasoning = model.starts_with("gpt-5") || model.starts_with("o1");
        Self {
            model,
            messages,
            max_tokens: (!reasoning).then_some(max_tokens),
            max_completion_tokens: reasoning.then_some(max_tokens),
            temperature: (!reasoning).then_some(ANALYSIS_TEMPERATURE),
            stream: false,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

/// Chat-completions client.
pub struct OpenAiAiClient {
    client: Client,
    flavor: ChatFlavor,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: i32,
}

impl OpenAiAiClient {
    /// Creates a client for an arbitrary compatible endpoint.
    pub fn new(
        flavor: ChatFlavor,
        model: String,
        api_key: Option<String>,
        base_url: String,
        max_tokens: i32,
    ) -> Result<Self> {
        Ok(Self {
            client: super::build_http_client()?,
            flavor,
            api_key,
            model,
            base_url,
            max_tokens,
        })
    }

    /// Local Ollama, at `base_url` or the default port.
    pub fn ollama(model: String, base_url: Option<String>, max_tokens: i32) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
        Self::new(ChatFlavor::Ollama, model, None, base_url, max_tokens)
    }

    /// The hosted OpenAI API.
    pub fn openai(model: String, api_key: String, max_tokens: i32) -> Result<Self> {
        Self::new(
            ChatFlavor::OpenAi,
            model,
            Some(api_key),
            OPENAI_BASE_URL.to_string(),
            max_tokens,
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", super::trim_base_url(&self.base_url))
    }
}

impl AiClient for OpenAiAiClient {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest::new(&self.model, self.max_tokens, system_prompt, user_prompt);
            let endpoint = self.endpoint();
            info!(
                url = %endpoint,
                flavor = %self.flavor,
                model = %self.model,
                prompt_len = system_prompt.len() + user_prompt.len(),
                "Sending chat completion request"
            );

            let mut builder = self.client.post(&endpoint).json(&request);
            if let Some(api_key) = &self.api_key {
                builder = builder.bearer_auth(api_key);
            }
            let response = builder
                .send()
                .await
                .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

            let response = super::check_error_response(response).await?;
            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::InvalidResponseFormat(e.to_string()))?;
            debug!(choices = body.choices.len(), usage = ?body.usage, "Received chat completion");

            let result = body
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| {
                    ServiceError::InvalidResponseFormat("No choices in response".to_string())
                        .into()
                });

            super::log_response_success(&self.flavor.to_string(), &result);
            result
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        AiClientMetadata {
            provider: self.flavor.to_string(),
            model: self.model.clone(),
            max_response_length: self.max_tokens as usize,
        }
    }
}
