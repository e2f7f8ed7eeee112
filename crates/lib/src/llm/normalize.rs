//! Normalises an Ollama `/api/chat` payload into a single-choice completion envelope.
//!
//! Ollama answers with either `{"message": {...}}` or `{"messages": [..., {...}]}`.

use crate::llm::ollama::OllamaError;
use crate::llm::types::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
    /// Present only when the model returned a non-empty list of tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

impl CompletionMessage {
    /// Tool calls that parse as [`ToolCall`]; malformed entries are skipped.
    pub fn parsed_tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .iter()
            .flatten()
            .filter_map(|v| match serde_json::from_value::<ToolCall>(v.clone()) {
                Ok(call) => Some(call),
                Err(e) => {
                    log::debug!("llm: skipping malformed tool call: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

/// Normalised completion. `model` and `created_at` are copied as-is (null when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<CompletionChoice>,
    pub model: Value,
    pub created_at: Value,
    pub raw_response: Value,
}

impl ChatCompletion {
    /// The single choice's message.
    pub fn message(&self) -> Option<&CompletionMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

fn extract_message(payload: &Value) -> Option<&Map<String, Value>> {
    if let Some(message) = payload.get("message").and_then(Value::as_object) {
        return Some(message);
    }
    payload
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|list| list.last())
        .and_then(Value::as_object)
}

/// Build the completion envelope from a raw payload.
pub fn normalize_response(payload: Value) -> Result<ChatCompletion, OllamaError> {
    let message = extract_message(&payload).ok_or(OllamaError::MissingMessage)?;

    let role = message
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("assistant")
        .to_string();
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .filter(|calls| !calls.is_empty())
        .cloned();

    Ok(ChatCompletion {
        choices: vec![CompletionChoice {
            message: CompletionMessage {
                role,
                content,
                tool_calls,
            },
        }],
        model: payload.get("model").cloned().unwrap_or(Value::Null),
        created_at: payload.get("created_at").cloned().unwrap_or(Value::Null),
        raw_response: payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_message_shape() {
        let payload = json!({
            "model": "llama3.2:latest",
            "created_at": "2024-05-01T10:00:00Z",
            "message": {"role": "assistant", "content": "hello"},
            "done": true
        });
        let out = normalize_response(payload.clone()).unwrap();
        assert_eq!(out.choices.len(), 1);
        let msg = out.message().unwrap();
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.content, "hello");
        assert!(msg.tool_calls.is_none());
        assert_eq!(out.model, json!("llama3.2:latest"));
        assert_eq!(out.created_at, json!("2024-05-01T10:00:00Z"));
        assert_eq!(out.raw_response, payload);
    }

    #[test]
    fn message_list_uses_the_last_entry() {
        let out = normalize_response(json!({
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": "a"}
            ]
        }))
        .unwrap();
        assert_eq!(out.message().unwrap().content, "a");
        assert_eq!(out.model, Value::Null);
        assert_eq!(out.created_at, Value::Null);
    }

    #[test]
    fn single_message_wins_over_list() {
        let out = normalize_response(json!({
            "message": {"content": "from message"},
            "messages": [{"content": "from list"}]
        }))
        .unwrap();
        assert_eq!(out.message().unwrap().content, "from message");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let out = normalize_response(json!({"message": {}})).unwrap();
        let msg = out.message().unwrap();
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.content, "");
    }

    #[test]
    fn tool_calls_only_when_non_empty() {
        let out = normalize_response(json!({
            "message": {"role": "assistant", "content": "", "tool_calls": []}
        }))
        .unwrap();
        assert!(out.message().unwrap().tool_calls.is_none());

        let out = normalize_response(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "wait", "arguments": {"reason": "dup"}}},
                    {"nonsense": true}
                ]
            }
        }))
        .unwrap();
        let msg = out.message().unwrap();
        assert_eq!(msg.tool_calls.as_ref().unwrap().len(), 2);
        let parsed = msg.parsed_tool_calls();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].function.name, "wait");
    }

    #[test]
    fn missing_message_is_an_error() {
        for payload in [
            json!({}),
            json!({"message": "text"}),
            json!({"messages": []}),
            json!({"messages": ["text"]}),
            json!({"messages": {"role": "assistant"}}),
        ] {
            let err = normalize_response(payload).unwrap_err();
            assert!(matches!(err, OllamaError::MissingMessage));
            assert_eq!(err.to_string(), "Ollama response missing message content");
        }
    }

    #[test]
    fn envelope_serialises_with_expected_keys() {
        let out = normalize_response(json!({"message": {"content": "x"}, "model": "m"})).unwrap();
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["choices"][0]["message"], json!({"role": "assistant", "content": "x"}));
        assert_eq!(v["model"], json!("m"));
        assert!(v.get("raw_response").is_some());
    }
}
