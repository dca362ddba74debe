//! The seam between the generator and an external text service.

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single generation request, or of a whole retry sequence.
///
/// These never leave [`crate::Generator`]; they are handed to observers
/// and then replaced by a fallback description.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Request(String),

    #[error("Backend returned an empty description")]
    EmptyResponse,

    #[error("Backend request failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<BackendError>,
    },
}

impl From<claude::Error> for BackendError {
    fn from(err: claude::Error) -> Self {
        BackendError::Request(err.to_string())
    }
}

/// One request/response exchange with a text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub system: String,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A text-generation service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one request and return the raw text content.
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError>;

    /// The model name requests run against when they don't set one.
    fn model(&self) -> &str;
}

#[async_trait]
impl CompletionBackend for Claude {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        let mut api_request = Request::new(vec![Message::user(request.prompt)])
            .with_system(request.system)
            .with_max_tokens(request.max_tokens)
            .with_temperature(request.temperature);
        if let Some(model) = request.model {
            api_request = api_request.with_model(model);
        }

        let response = Claude::complete(self, api_request).await?;
        Ok(response.text())
    }

    fn model(&self) -> &str {
        Claude::model(self)
    }
}

#[async_trait]
impl<B: CompletionBackend + ?Sized> CompletionBackend for Arc<B> {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        (**self).complete(request).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

#[async_trait]
impl<B: CompletionBackend + ?Sized> CompletionBackend for Box<B> {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        (**self).complete(request).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}
