//! Backend relay client: POST `{conversation_id, message}`, read `{reply}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on a single backend round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend response malformed: {0}")]
    Decode(String),
}

/// Relays one inbound message to the conversation backend and returns its reply.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn relay(&self, conversation_id: &str, message: &str) -> Result<String, RelayError>;
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    conversation_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// HTTP client for the gateway's bridge endpoint.
#[derive(Clone)]
pub struct RelayClient {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for RelayClient {
    async fn relay(&self, conversation_id: &str, message: &str) -> Result<String, RelayError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&RelayRequest {
                conversation_id,
                message,
            });
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let data: RelayResponse =
            serde_json::from_str(&body).map_err(|e| RelayError::Decode(e.to_string()))?;
        Ok(data.reply.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::Server, token: Option<&str>) -> RelayClient {
        RelayClient::new(
            format!("{}/api/v1/bridge/imessage", server.url()),
            token.map(String::from),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_json_and_returns_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/bridge/imessage")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Json(json!({
                "conversation_id": "iMessage;-;+1555",
                "message": "hi there"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"reply": "hello back", "extra": 1}"#)
            .create_async()
            .await;

        let reply = client_for(&server, None)
            .relay("iMessage;-;+1555", "hi there")
            .await
            .unwrap();
        assert_eq!(reply, "hello back");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/bridge/imessage")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .with_body(r#"{"reply": ""}"#)
            .create_async()
            .await;

        let reply = client_for(&server, Some("s3cret"))
            .relay("c", "m")
            .await
            .unwrap();
        assert_eq!(reply, "");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_or_null_reply_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/bridge/imessage")
            .with_status(200)
            .with_body(r#"{"reply": null}"#)
            .create_async()
            .await;
        assert_eq!(client_for(&server, None).relay("c", "m").await.unwrap(), "");
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/bridge/imessage")
            .with_status(502)
            .with_body(r#"{"error": "processing failed"}"#)
            .create_async()
            .await;

        let err = client_for(&server, None).relay("c", "m").await.unwrap_err();
        match err {
            RelayError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("processing failed"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/bridge/imessage")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server, None).relay("c", "m").await.unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[tokio::test]
    async fn wrong_shape_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/bridge/imessage")
            .with_status(200)
            .with_body(r#"{"reply": 12}"#)
            .create_async()
            .await;

        let err = client_for(&server, None).relay("c", "m").await.unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RelayClient::new(
            format!("http://127.0.0.1:{}/bridge", port),
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.relay("c", "m").await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
