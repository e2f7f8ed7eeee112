//! Chat-completion adapter for a local Ollama server.
//!
//! Requests go to `<host>/api/chat` without streaming; responses are normalised to a
//! single-choice completion envelope regardless of which shape Ollama answered with.

mod normalize;
mod ollama;
mod types;

pub use normalize::{normalize_response, ChatCompletion, CompletionChoice, CompletionMessage};
pub use ollama::{build_messages, OllamaClient, OllamaError, CHAT_PATH, REQUEST_TIMEOUT};
pub use types::{
    ChatMessage, ChatRequest, ToolCall, ToolCallFunction, ToolDefinition, ToolFunctionDefinition,
};
