//! Gateway HTTP wire types.

use serde::{Deserialize, Serialize};

pub const MAX_CONVERSATION_ID_CHARS: usize = 256;

/// Body of `POST /api/v1/bridge/imessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub conversation_id: String,
    pub message: String,
}

impl BridgeRequest {
    /// conversation_id must be 1..=256 characters; message must be non-empty.
    pub fn validate(&self) -> Result<(), String> {
        let id_len = self.conversation_id.chars().count();
        if id_len == 0 {
            return Err("conversation_id must not be empty".to_string());
        }
        if id_len > MAX_CONVERSATION_ID_CHARS {
            return Err(format!(
                "conversation_id must be at most {} characters",
                MAX_CONVERSATION_ID_CHARS
            ));
        }
        if self.message.is_empty() {
            return Err("message must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub reply: String,
}

/// `GET /` health payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub runtime: String,
    pub sessions: usize,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str, message: &str) -> BridgeRequest {
        BridgeRequest {
            conversation_id: id.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn validation_bounds() {
        assert!(req("c", "m").validate().is_ok());
        assert!(req("", "m").validate().is_err());
        assert!(req("c", "").validate().is_err());
        assert!(req(&"x".repeat(256), "m").validate().is_ok());
        assert!(req(&"x".repeat(257), "m").validate().is_err());
        // Characters, not bytes.
        assert!(req(&"é".repeat(256), "m").validate().is_ok());
    }
}
