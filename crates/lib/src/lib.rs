//! murmur core library: iMessage relay, conversation gateway, session management, and
//! the Ollama chat-completion adapter used by both subcommands of the CLI.

pub mod agent;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod relay;
pub mod session;
pub mod shutdown;
