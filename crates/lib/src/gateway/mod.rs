//! Gateway: HTTP backend for the relay.
//!
//! `POST /api/v1/bridge/imessage` runs a message through the conversation's session and
//! returns the reply; `GET /` reports health.

mod error;
mod protocol;
mod server;

pub use error::ApiError;
pub use protocol::{BridgeRequest, BridgeResponse, Health, MAX_CONVERSATION_ID_CHARS};
pub use server::{router, run_gateway, GatewayState, BRIDGE_PATH};
