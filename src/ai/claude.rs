//! Anthropic Messages API provider.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use reqwest::Client;
use tracing::info;

use super::messages::{self, MessagesRequest};
use super::{AiClient, AiClientMetadata};

/// Default endpoint for the Anthropic Messages API.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Talks to `/v1/messages` with an `x-api-key` credential.
pub struct ClaudeAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: i32,
}

impl ClaudeAiClient {
    /// Creates a client against the public Anthropic endpoint.
    pub fn new(model: String, api_key: String, max_tokens: i32) -> Result<Self> {
        Self::with_base_url(model, api_key, ANTHROPIC_BASE_URL.to_string(), max_tokens)
    }

    /// Creates a client against a custom endpoint (proxies, test servers).
    pub fn with_base_url(
        model: String,
        api_key: String,
        base_url: String,
        max_tokens: i32,
    ) -> Result<Self> {
        Ok(Self {
            client: super::build_http_client()?,
            api_key,
            model,
            base_url,
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", super::trim_base_url(&self.base_url))
    }
}

impl AiClient for ClaudeAiClient {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let request =
                MessagesRequest::for_model(&self.model, self.max_tokens, system_prompt, user_prompt);
            let endpoint = self.endpoint();
            info!(
                url = %endpoint,
                model = %self.model,
                prompt_len = system_prompt.len() + user_prompt.len(),
                "Sending request to Claude API"
            );

            let builder = self
                .client
                .post(&endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION);
            messages::send("Claude", builder, &request).await
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        AiClientMetadata {
            provider: "Anthropic".to_string(),
            model: self.model.clone(),
            max_response_length: self.max_tokens as usize,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::ai::ServiceError;

    fn client_for(server: &MockServer) -> ClaudeAiClient {
        ClaudeAiClient::with_base_url(
            "claude-sonnet-4-20250514".to_string(),
            "test-key".to_string(),
            server.uri(),
            1024,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn send_request_extracts_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "system": "system"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "thinking"},
                    {"type": "text", "text": "# Summary\nLooks fine."}
                ],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server).send_request("system", "user").await.unwrap();
        assert_eq!(text, "# Summary\nLooks fine.");
    }

    #[tokio::test]
    async fn send_request_without_text_block_is_invalid_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "content": [] })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).send_request("", "user").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::InvalidResponseFormat(_))
        ));
    }

    #[test]
    fn get_metadata_reports_anthropic() {
        let client =
            ClaudeAiClient::new("claude-sonnet-4-20250514".to_string(), "k".to_string(), 2048)
                .unwrap();
        let metadata = client.get_metadata();
        assert_eq!(metadata.provider, "Anthropic");
        assert_eq!(metadata.model, "claude-sonnet-4-20250514");
        assert_eq!(metadata.max_response_length, 2048);
        assert_eq!(client.endpoint(), "https://api.anthropic.com/v1/messages");
    }
}
