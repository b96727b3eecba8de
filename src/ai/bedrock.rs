//! Claude through an AWS Bedrock invoke endpoint.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::messages::{self, MessagesRequest};
use super::{AiClient, AiClientMetadata, ServiceError};

/// Posts to `<base>/model/<model id>/invoke` with a bearer token.
pub struct BedrockAiClient {
    client: Client,
    auth_token: String,
    model: String,
    base_url: String,
    max_tokens: i32,
}

impl BedrockAiClient {
    /// Creates a client for the given Bedrock gateway.
    pub fn new(model: String, auth_token: String, base_url: String, max_tokens: i32) -> Result<Self> {
        Ok(Self {
            client: super::build_http_client()?,
            auth_token,
            model,
            base_url,
            max_tokens,
        })
    }

    /// Builds the invoke URL, keeping any path prefix of the base URL.
    ///
    /// Bedrock model ids contain `:`, so the id is form-encoded as one
    /// path segment.
    fn invoke_url(&self) -> Result<Url, ServiceError> {
        let mut base = Url::parse(&self.base_url)
            .map_err(|e| ServiceError::NetworkError(format!("Invalid base URL: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let model_id: String = url::form_urlencoded::byte_serialize(self.model.as_bytes()).collect();
        let url = base
            .join(&format!("model/{model_id}/invoke"))
            .map_err(|e| ServiceError::NetworkError(format!("Failed to build invoke URL: {e}")))?;
        debug!(model = %self.model, url = %url, "Resolved Bedrock invoke URL");
        Ok(url)
    }
}

impl AiClient for BedrockAiClient {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.invoke_url()?;
            let request = MessagesRequest::for_bedrock(self.max_tokens, system_prompt, user_prompt);
            info!(
                url = %url,
                model = %self.model,
                prompt_len = system_prompt.len() + user_prompt.len(),
                "Sending request to Bedrock"
            );

            let builder = self.client.post(url).bearer_auth(&self.auth_token);
            messages::send("Bedrock", builder, &request).await
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        AiClientMetadata {
            provider: "Anthropic Bedrock".to_string(),
            model: self.model.clone(),
            max_response_length: self.max_tokens as usize,
        }
    }
}
