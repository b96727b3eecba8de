//! Anthropic Messages wire format, shared by the direct API and Bedrock.
//!
//! Both endpoints accept the same body apart from how the model is named:
//! the direct API carries `model` in the body, Bedrock carries it in the URL
//! and expects `anthropic_version` instead.

use anyhow::Result;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ServiceError;

/// Body version string Bedrock requires in place of a model field.
pub(crate) const BEDROCK_VERSION: &str = "bedrock-2023-05-31";

#[derive(Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: &'a str,
}

/// One single-turn request: optional system prompt plus the user prompt.
#[derive(Serialize)]
pub(crate) struct MessagesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anthropic_version: Option<&'static str>,
    max_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [UserTurn<'a>; 1],
}

impl<'a> MessagesRequest<'a> {
    /// Request addressed to a model by name in the body.
    pub(crate) fn for_model(model: &'a str, max_tokens: i32, system: &'a str, user: &'a str) -> Self {
        Self {
            model: Some(model),
            anthropic_version: None,
            max_tokens,
            system: (!system.is_empty()).then_some(system),
            messages: [UserTurn {
                role: "user",
                content: user,
            }],
        }
    }

    /// Request for an endpoint that names the model in its URL.
    pub(crate) fn for_bedrock(max_tokens: i32, system: &'a str, user: &'a str) -> Self {
        Self {
            model: None,
            anthropic_version: Some(BEDROCK_VERSION),
            ..Self::for_model("", max_tokens, system, user)
        }
    }
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

/// Sends a prepared request and returns the first text block of the reply.
pub(crate) async fn send(
    provider: &str,
    builder: RequestBuilder,
    request: &MessagesRequest<'_>,
) -> Result<String> {
    let response = builder
        .header("content-type", "application/json")
        .json(request)
        .send()
        .await
        .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

    let response = super::check_error_response(response).await?;
    let body: MessagesResponse = response
        .json()
        .await
        .map_err(|e| ServiceError::InvalidResponseFormat(e.to_string()))?;

    debug!(
        provider,
        blocks = body.content.len(),
        stop_reason = ?body.stop_reason,
        input_tokens = ?body.usage.as_ref().and_then(|u| u.input_tokens),
        output_tokens = ?body.usage.as_ref().and_then(|u| u.output_tokens),
        "Received Messages API response"
    );

    let result = body
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .map(|block| block.text)
        .ok_or_else(|| {
            ServiceError::InvalidResponseFormat("No text content in response".to_string()).into()
        });

    super::log_response_success(provider, &result);
    result
}
