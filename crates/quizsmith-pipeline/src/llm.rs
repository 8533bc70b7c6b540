//! Text-completion collaborator: prompt string in, raw text out.
//!
//! The pipeline never interprets model identity, token accounting, or
//! retry policy; a `ParseFailure` or `SchemaViolation` downstream is the
//! caller's signal to decide whether to call again.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("completion endpoint returned a malformed payload: {0}")]
    MalformedResponse(String),
}

/// The whole response contract: the generated text and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
}

pub trait TextCompletion {
    /// Run one completion call for `prompt`.
    ///
    /// # Errors
    /// Returns a [`CompletionError`] when the call cannot produce text.
    fn complete(&self, prompt: &str) -> Result<CompletionResponse, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl HttpClientConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), timeout_secs: 60 }
    }
}

/// HTTP client posting `{"prompt": ...}` and reading `{"text": ...}`.
pub struct HttpCompletionClient {
    agent: ureq::Agent,
    config: HttpClientConfig,
}

impl HttpCompletionClient {
    #[must_use]
    pub fn new(config: HttpClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self { agent, config }
    }
}

impl TextCompletion for HttpCompletionClient {
    fn complete(&self, prompt: &str) -> Result<CompletionResponse, CompletionError> {
        let response = self
            .agent
            .post(&self.config.endpoint)
            .send_json(json!({ "prompt": prompt }));

        match response {
            Ok(response) => response
                .into_json::<CompletionResponse>()
                .map_err(|err| CompletionError::MalformedResponse(err.to_string())),
            Err(ureq::Error::Status(status, response)) => Err(CompletionError::Endpoint {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(CompletionError::Transport(transport.to_string()))
            }
        }
    }
}
