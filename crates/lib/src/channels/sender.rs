//! Outbound sender: delivers a reply into Messages through `osascript`.
//!
//! Text is spliced into an AppleScript string literal, so every character that could end
//! the literal or start an escape sequence is escaped first. The script is passed as a
//! single argv entry; no shell is involved.

use async_trait::async_trait;
use tokio::process::Command;

const OSASCRIPT: &str = "osascript";

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("messages send exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
}

/// Delivers a text reply to a conversation in the messaging application.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), SendError>;
}

/// Escape text for use inside a double-quoted AppleScript string literal.
pub fn escape_applescript_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// AppleScript that sends `text` to the chat whose id is `chat_guid`.
pub fn build_send_script(chat_guid: &str, text: &str) -> String {
    format!(
        "tell application \"Messages\"\n    set targetChat to first chat whose id is \"{}\"\n    send \"{}\" to targetChat\nend tell",
        escape_applescript_text(chat_guid),
        escape_applescript_text(text)
    )
}

/// Sends via `osascript -e <script>`.
#[derive(Debug, Clone)]
pub struct AppleScriptSender {
    program: String,
}

impl Default for AppleScriptSender {
    fn default() -> Self {
        Self::new()
    }
}

impl AppleScriptSender {
    pub fn new() -> Self {
        Self {
            program: OSASCRIPT.to_string(),
        }
    }

    /// Use a different interpreter binary (tests, wrappers).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl OutboundSender for AppleScriptSender {
    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), SendError> {
        let script = build_send_script(conversation_id, text);
        let output = Command::new(&self.program)
            .arg("-e")
            .arg(&script)
            .output()
            .await
            .map_err(|source| SendError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(SendError::Exit {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reads one AppleScript string literal starting right after its opening quote.
    /// Returns the decoded value and the unconsumed remainder after the closing quote.
    fn read_literal(s: &str) -> (String, &str) {
        let mut out = String::new();
        let mut chars = s.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return (out, &s[i + 1..]),
                '\\' => match chars.next().map(|(_, e)| e) {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => panic!("dangling escape"),
                },
                _ => out.push(c),
            }
        }
        panic!("unterminated literal");
    }

    #[test]
    fn escapes_quotes_backslashes_and_line_breaks() {
        assert_eq!(escape_applescript_text(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_applescript_text("one\ntwo\r"), "one\\ntwo\\r");
        assert_eq!(escape_applescript_text("plain ✓"), "plain ✓");
    }

    #[test]
    fn hostile_text_stays_inside_the_string_literal() {
        let text = "hi\" to targetChat\ndo shell script \"rm -rf ~\" -- \\\" end";
        let script = build_send_script("iMessage;-;+1555", text);
        let send_line = script
            .lines()
            .find(|l| l.trim_start().starts_with("send \""))
            .unwrap();
        let after_open = &send_line[send_line.find('"').unwrap() + 1..];
        let (decoded, rest) = read_literal(after_open);
        assert_eq!(decoded, text);
        assert_eq!(rest, " to targetChat");
        assert_eq!(script.lines().count(), 4);
    }

    #[test]
    fn chat_guid_is_escaped_too() {
        let script = build_send_script("evil\"guid", "x");
        assert!(script.contains(r#"whose id is "evil\"guid""#));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_success() {
        let sender = AppleScriptSender::with_program("true");
        sender.send("chat", "hello").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let sender = AppleScriptSender::with_program("false");
        let err = sender.send("chat", "hello").await.unwrap_err();
        assert!(matches!(err, SendError::Exit { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let sender = AppleScriptSender::with_program("murmur-no-such-binary-4d1c");
        let err = sender.send("chat", "hello").await.unwrap_err();
        assert!(matches!(err, SendError::Spawn { .. }));
    }
}
