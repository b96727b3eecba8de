//! Shared test utilities for the `ai` module.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::ai::{AiClient, AiClientMetadata};

type Responder = dyn Fn(usize, &str, &str) -> Result<String> + Send + Sync;

/// Mock AI client whose answers come from a closure.
///
/// The closure receives the zero-based call index together with the
/// `(system_prompt, user_prompt)` pair, so tests can script failures for
/// particular prompts regardless of the order concurrent workers call in.
///
/// Every call records its prompts. Use [`prompt_handle`](Self::prompt_handle)
/// to obtain a shared handle for reading them after the client has been
/// moved into a [`GenerationClient`](super::GenerationClient).
pub(crate) struct FnAiClient {
    responder: Box<Responder>,
    calls: AtomicUsize,
    metadata: AiClientMetadata,
    recorded_prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl FnAiClient {
    /// Creates a mock client answering with `responder`.
    pub(crate) fn new(
        responder: impl Fn(usize, &str, &str) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            metadata: AiClientMetadata {
                provider: "Mock".to_string(),
                model: "mock-model".to_string(),
                max_response_length: 8_192,
            },
            recorded_prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a deterministic mock that answers with the user prompt.
    pub(crate) fn echo() -> Self {
        Self::new(|_, _, user| Ok(user.to_string()))
    }

    /// Returns a handle for inspecting which prompts were sent.
    pub(crate) fn prompt_handle(&self) -> PromptRecordHandle {
        PromptRecordHandle {
            recorded_prompts: self.recorded_prompts.clone(),
        }
    }
}

/// Shared handle to a mock client's recorded prompts.
pub(crate) struct PromptRecordHandle {
    recorded_prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl PromptRecordHandle {
    /// Returns all recorded `(system_prompt, user_prompt)` pairs.
    pub(crate) fn prompts(&self) -> Vec<(String, String)> {
        self.recorded_prompts.lock().unwrap().clone()
    }

    /// Returns the number of AI requests that were made.
    pub(crate) fn request_count(&self) -> usize {
        self.recorded_prompts.lock().unwrap().len()
    }
}

impl AiClient for FnAiClient {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.recorded_prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            (self.responder)(call, system_prompt, user_prompt)
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        self.metadata.clone()
    }
}
