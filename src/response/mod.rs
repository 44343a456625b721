//! Turning a transcript into a spoken-style reply.
//!
//! [`ResponseGenerator`] is the seam the orchestrator calls from a scheduled
//! task.  [`ChatResponder`] is the production implementation backed by any
//! OpenAI-compatible chat endpoint; prompt wording lives entirely in
//! configuration.

pub mod chat;
pub mod history;

use async_trait::async_trait;
use thiserror::Error;

pub use chat::ChatResponder;
pub use history::{Conversation, Exchange};

// ---------------------------------------------------------------------------
// ResponseError
// ---------------------------------------------------------------------------

/// Errors that can occur while generating a reply.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("response request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The model returned no usable text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for ResponseError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ResponseError::Timeout
        } else {
            ResponseError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseGenerator trait
// ---------------------------------------------------------------------------

/// Progress sink handed to a generator; each call becomes a
/// `loading_message` event.
pub type Progress<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Async reply generation.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn ResponseGenerator>` with scheduled tasks.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn respond(&self, utterance: &str, progress: Progress<'_>) -> Result<String, ResponseError>;
}
