//! [`ChatResponder`]: replies from an OpenAI-compatible `/v1/chat/completions`
//! endpoint (Ollama, OpenAI, Groq, LM Studio, vLLM, ...).
//!
//! All connection details come from [`ResponderConfig`]; nothing is
//! hardcoded.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ResponderConfig;

use super::history::{Conversation, Exchange};
use super::{Progress, ResponseError, ResponseGenerator};

/// Progress text reported while the request is in flight.
pub const THINKING_MESSAGE: &str = "Thinking";

pub struct ChatResponder {
    client: reqwest::Client,
    config: ResponderConfig,
    conversation: Mutex<Conversation>,
}

impl std::fmt::Debug for ChatResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatResponder")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl ChatResponder {
    /// Build a responder from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; a default client is used if the builder fails.
    pub fn from_config(config: &ResponderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            conversation: Mutex::new(Conversation::new(
                config.history_turns,
                Duration::from_secs(config.history_reset_secs),
            )),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, utterance: &str, history: &[Exchange]) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": self.config.system_prompt })];
        for exchange in history {
            messages.push(json!({ "role": "user", "content": exchange.utterance }));
            messages.push(json!({ "role": "assistant", "content": exchange.reply }));
        }
        messages.push(json!({ "role": "user", "content": utterance }));

        json!({
            "model":       self.config.model,
            "messages":    messages,
            "stream":      false,
            "temperature": self.config.temperature,
        })
    }

    fn conversation(&self) -> std::sync::MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pull the first choice's message text out of a chat-completions response.
fn parse_reply(json: &Value) -> Result<String, ResponseError> {
    let reply = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(ResponseError::EmptyResponse)?
        .trim()
        .to_string();

    if reply.is_empty() {
        return Err(ResponseError::EmptyResponse);
    }
    Ok(reply)
}

#[async_trait]
impl ResponseGenerator for ChatResponder {
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is a non-empty string, so local providers that need
    /// no authentication work unchanged.
    async fn respond(&self, utterance: &str, progress: Progress<'_>) -> Result<String, ResponseError> {
        progress(THINKING_MESSAGE);

        let history = self.conversation().recent();
        let body = self.request_body(utterance, &history);

        let mut req = self.client.post(self.endpoint()).json(&body);
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?.error_for_status()?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| ResponseError::Parse(e.to_string()))?;

        let reply = parse_reply(&json)?;
        self.conversation().push(utterance, reply.clone());
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
