//! Message source: reads new inbound messages from the Messages database (chat.db).
//!
//! Each read re-queries from the caller's cursor; nothing is cached between reads, so a
//! message whose relay failed is returned again on the next read.

use crate::channels::inbound::InboundMessage;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

const NEW_MESSAGES_SQL: &str = "
    SELECT message.ROWID, message.text, chat.guid
    FROM message
    JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
    JOIN chat ON chat.ROWID = chat_message_join.chat_id
    WHERE message.is_from_me = 0
      AND message.text IS NOT NULL
      AND message.ROWID > ?1
    ORDER BY message.ROWID ASC, chat.ROWID ASC
";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("message store not found at {0}")]
    NotFound(String),
    #[error("message store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Source of new inbound messages, ascending by id.
pub trait MessageSource: Send {
    /// All relayable messages with id greater than `cursor`, in ascending id order.
    fn read_since(&self, cursor: i64) -> Result<Vec<InboundMessage>, SourceError>;
}

/// Read-only reader over the macOS Messages database.
pub struct ChatDbSource {
    conn: Connection,
}

impl ChatDbSource {
    /// Open the database read-only. Fails if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !path.exists() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }
}

impl MessageSource for ChatDbSource {
    fn read_since(&self, cursor: i64) -> Result<Vec<InboundMessage>, SourceError> {
        let mut stmt = self.conn.prepare_cached(NEW_MESSAGES_SQL)?;
        let rows = stmt.query_map(params![cursor], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut out: Vec<InboundMessage> = Vec::new();
        for row in rows {
            let (id, text, guid) = row?;
            let (Some(text), Some(guid)) = (text, guid) else {
                continue;
            };
            if text.is_empty() || guid.is_empty() {
                continue;
            }
            // A message joined to several chats is relayed once, to the first chat.
            if out.last().is_some_and(|m| m.id == id) {
                continue;
            }
            out.push(InboundMessage {
                id,
                text,
                conversation_id: guid,
            });
        }
        Ok(out)
    }
}
