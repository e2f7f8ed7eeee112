//! Messaging channel seams (iMessage).
//!
//! The message source reads new inbound messages from the local Messages store;
//! the outbound sender posts replies back into Messages via AppleScript.

mod inbound;
mod sender;
mod source;

pub use inbound::InboundMessage;
pub use sender::{
    build_send_script, escape_applescript_text, AppleScriptSender, OutboundSender, SendError,
};
pub use source::{ChatDbSource, MessageSource, SourceError};
