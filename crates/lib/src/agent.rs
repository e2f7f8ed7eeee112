//! Interaction agent: one per conversation, answering through a local Ollama model.
//!
//! Each turn records the user's message, sends the rendered transcript to the model with
//! two tools (`send_message_to_user`, `wait`), and turns the model's answer into a reply.

use crate::config::{self, Config};
use crate::conversation::{
    render_entry, ConversationLog, InMemoryConversationLog, LogTag, NullConversationLog,
};
use crate::llm::{ChatMessage, ChatRequest, OllamaClient, ToolDefinition};
use crate::session::{AgentRuntime, InteractionResult, RuntimeFactory};
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_MODEL: &str = "llama3.2:latest";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful personal assistant chatting with the user over iMessage. \
The conversation so far is given as tagged entries: <user_message> is the user, <poke_reply> is what you already sent, \
<wait> marks a turn where you chose to stay silent. \
Reply to the latest user message with send_message_to_user, keeping it short and conversational. \
If the latest message needs no answer or you already answered it, call wait instead.";

const SEND_MESSAGE_TOOL: &str = "send_message_to_user";
const WAIT_TOOL: &str = "wait";

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            SEND_MESSAGE_TOOL,
            "Deliver a natural-language response directly to the user.",
            json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Plain-text message shown to the user and recorded in the conversation log."
                    }
                },
                "required": ["message"],
                "additionalProperties": false
            }),
        ),
        ToolDefinition::function(
            WAIT_TOOL,
            "Stay silent when the latest message needs no reply or was already answered.",
            json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Brief explanation of why no reply is sent."
                    }
                },
                "required": ["reason"],
                "additionalProperties": false
            }),
        ),
    ]
}

/// Agent runtime for a single conversation.
pub struct InteractionRuntime {
    conversation_id: String,
    client: OllamaClient,
    model: String,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    transcript: Box<dyn ConversationLog>,
    working_memory: Box<dyn ConversationLog>,
}

impl InteractionRuntime {
    pub fn new(
        conversation_id: &str,
        client: OllamaClient,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
            tools: tool_definitions(),
            transcript: Box::new(InMemoryConversationLog::new()),
            working_memory: Box::new(NullConversationLog),
        }
    }

    /// Rendered transcript (tagged lines, oldest first).
    pub fn transcript(&self) -> String {
        self.transcript.render()
    }

    fn system_message(&self) -> String {
        let today = chrono::Local::now().format("%A, %B %-d, %Y");
        let mut system = format!("Today's date is {}.\n\n{}", today, self.system_prompt);
        let memory = self.working_memory.render();
        if !memory.trim().is_empty() {
            system.push_str("\n\n<working_memory>\n");
            system.push_str(&memory);
            system.push_str("\n</working_memory>");
        }
        system
    }
}

#[async_trait]
impl AgentRuntime for InteractionRuntime {
    async fn execute(&mut self, text: &str) -> InteractionResult {
        // The user message is recorded only after the model answers.
        let mut history = self.transcript.render();
        if !history.is_empty() {
            history.push('\n');
        }
        history.push_str(&render_entry(LogTag::UserMessage, text));

        let request = ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::user(format!(
                "<conversation_history>\n{}\n</conversation_history>",
                history
            ))],
        )
        .with_system(self.system_message())
        .with_tools(self.tools.clone());
        let completion = match self.client.complete(&request).await {
            Ok(c) => c,
            Err(e) => {
                log::warn!("agent: completion for {} failed: {}", self.conversation_id, e);
                return InteractionResult::failed(e.to_string());
            }
        };
        let Some(message) = completion.message() else {
            return InteractionResult::failed("completion had no choices");
        };
        self.transcript.record(LogTag::UserMessage, text);

        let calls = message.parsed_tool_calls();
        let mut parts: Vec<String> = Vec::new();
        if calls.is_empty() {
            parts.push(message.content.clone());
        }
        for call in &calls {
            match call.function.name.as_str() {
                SEND_MESSAGE_TOOL => match call.function.string_arg("message") {
                    Some(m) => parts.push(m),
                    None => log::warn!("agent: {} called without a message", SEND_MESSAGE_TOOL),
                },
                WAIT_TOOL => {
                    let reason = call.function.string_arg("reason").unwrap_or_default();
                    log::debug!("agent: {} waiting: {}", self.conversation_id, reason);
                    self.transcript.record(LogTag::Wait, &reason);
                }
                other => log::warn!("agent: ignoring unknown tool {}", other),
            }
        }

        let reply = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !reply.is_empty() {
            self.transcript.record(LogTag::PokeReply, &reply);
        }
        InteractionResult::ok(reply)
    }
}

/// Creates an [`InteractionRuntime`] per conversation from shared settings.
#[derive(Clone)]
pub struct InteractionRuntimeFactory {
    client: OllamaClient,
    model: String,
    system_prompt: String,
}

impl InteractionRuntimeFactory {
    pub fn new(client: OllamaClient, model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Host from OLLAMA_HOST or config; model and system prompt from `agents`.
    pub fn from_config(config: &Config) -> Self {
        let model = config
            .agents
            .default_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL);
        let system_prompt = config
            .agents
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        Self::new(
            OllamaClient::new(Some(config::resolve_ollama_host(config, &config::process_env))),
            model,
            system_prompt,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl RuntimeFactory for InteractionRuntimeFactory {
    fn create(&self, conversation_id: &str) -> Box<dyn AgentRuntime> {
        Box::new(InteractionRuntime::new(
            conversation_id,
            self.client.clone(),
            self.model.clone(),
            self.system_prompt.clone(),
        ))
    }
}
