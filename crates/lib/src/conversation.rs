//! Per-conversation transcript used to build the agent's prompt.
//!
//! Entries live for the life of the process; nothing is written to disk.

use std::fmt;

/// Kind of transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    UserMessage,
    AgentMessage,
    PokeReply,
    Wait,
}

impl LogTag {
    pub fn as_str(self) -> &'static str {
        match self {
            LogTag::UserMessage => "user_message",
            LogTag::AgentMessage => "agent_message",
            LogTag::PokeReply => "poke_reply",
            LogTag::Wait => "wait",
        }
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only conversation transcript.
pub trait ConversationLog: Send {
    fn record(&mut self, tag: LogTag, text: &str);

    /// Transcript as tagged lines, oldest first.
    fn render(&self) -> String;

    fn clear(&mut self);
}

/// Escape `&`, `<` and `>`; quotes are left alone.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// One transcript line: `<tag>escaped text</tag>`.
pub fn render_entry(tag: LogTag, text: &str) -> String {
    format!("<{tag}>{}</{tag}>", escape_markup(text))
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryConversationLog {
    entries: Vec<(LogTag, String)>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConversationLog for InMemoryConversationLog {
    fn record(&mut self, tag: LogTag, text: &str) {
        self.entries.push((tag, text.to_string()));
    }

    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(tag, text)| render_entry(*tag, text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Log that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConversationLog;

impl ConversationLog for NullConversationLog {
    fn record(&mut self, _tag: LogTag, _text: &str) {}

    fn render(&self) -> String {
        String::new()
    }

    fn clear(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tagged_lines_in_order() {
        let mut log = InMemoryConversationLog::new();
        log.record(LogTag::UserMessage, "hi");
        log.record(LogTag::PokeReply, "hello");
        log.record(LogTag::Wait, "nothing to add");
        assert_eq!(
            log.render(),
            "<user_message>hi</user_message>\n<poke_reply>hello</poke_reply>\n<wait>nothing to add</wait>"
        );
    }

    #[test]
    fn escapes_markup_but_not_quotes() {
        let mut log = InMemoryConversationLog::new();
        log.record(LogTag::AgentMessage, r#"a < b && "c" > 'd'"#);
        assert_eq!(
            log.render(),
            r#"<agent_message>a &lt; b &amp;&amp; "c" &gt; 'd'</agent_message>"#
        );
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = InMemoryConversationLog::new();
        log.record(LogTag::UserMessage, "x");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.render(), "");
    }

    #[test]
    fn null_log_keeps_nothing() {
        let mut log = NullConversationLog;
        log.record(LogTag::UserMessage, "x");
        assert_eq!(log.render(), "");
    }
}
