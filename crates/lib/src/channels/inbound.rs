//! Inbound message read from the local message store, handed to the relay loop.

/// One message from the store to be relayed to the backend and optionally answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Store row id; unique and strictly increasing per store.
    pub id: i64,
    pub text: String,
    /// Chat guid the reply is delivered back to.
    pub conversation_id: String,
}
