//! Ollama API client (`POST <host>/api/chat`, non-streaming).

use crate::llm::normalize::{normalize_response, ChatCompletion};
use crate::llm::types::{ChatMessage, ChatRequest, ToolDefinition};
use serde::Serialize;
use std::time::Duration;

pub const CHAT_PATH: &str = "/api/chat";

/// Per-request timeout for chat completions.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Ollama host not configured. Set OLLAMA_HOST environment variable.")]
    NotConfigured,
    #[error("Ollama request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Ollama request failed ({status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("Ollama response was not valid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Ollama response missing message content")]
    MissingMessage,
}

/// Prepend a system message when `system` is non-blank.
pub fn build_messages(messages: Vec<ChatMessage>, system: Option<&str>) -> Vec<ChatMessage> {
    match system.filter(|s| !s.trim().is_empty()) {
        Some(system) => {
            let mut out = Vec::with_capacity(messages.len() + 1);
            out.push(ChatMessage::system(system));
            out.extend(messages);
            out
        }
        None => messages,
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

/// Client for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    host: Option<String>,
    client: reqwest::Client,
}

impl OllamaClient {
    /// `host` is the base URL (e.g. `http://127.0.0.1:11434`); blank means unconfigured.
    pub fn new(host: Option<String>) -> Self {
        let host = host
            .map(|h| h.trim().trim_end_matches('/').to_string())
            .filter(|h| !h.is_empty());
        Self {
            host,
            client: reqwest::Client::new(),
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Send `request` (blank-content messages dropped, roles trimmed) and normalise the response.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, OllamaError> {
        self.chat_completion(
            &request.model,
            request.completion_messages(),
            request.system.as_deref(),
            request.tools.as_deref(),
        )
        .await
    }

    /// Request a completion and normalise the response.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        system: Option<&str>,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatCompletion, OllamaError> {
        let host = self.host.as_deref().ok_or(OllamaError::NotConfigured)?;
        let url = format!("{}{}", host, CHAT_PATH);
        let body = OllamaChatRequest {
            model,
            messages: build_messages(messages, system),
            stream: false,
            tools: tools.filter(|t| !t.is_empty()),
        };
        log::debug!("llm: POST {} model={}", url, model);
        let res = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            // JSON error bodies are re-serialised compactly; anything else is passed through.
            let detail = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| serde_json::to_string(&v).ok())
                .unwrap_or(text);
            return Err(OllamaError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        let payload: serde_json::Value =
            serde_json::from_str(&text).map_err(OllamaError::InvalidJson)?;
        normalize_response(payload)
    }
}
