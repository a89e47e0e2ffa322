//! Pushover delivery — a form-encoded POST with two credential fields and
//! the message body. The response is not interpreted.

use crate::Notifier;
use async_trait::async_trait;
use emissary_core::error::NotifyError;
use std::time::Duration;
use tracing::{debug, warn};

/// The Pushover messages endpoint.
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover-backed notification sink.
pub struct PushoverNotifier {
    token: String,
    user_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl PushoverNotifier {
    /// Create a notifier for the real Pushover endpoint.
    pub fn new(token: impl Into<String>, user_key: impl Into<String>) -> Self {
        Self::with_endpoint(token, user_key, PUSHOVER_API_URL)
    }

    /// Create a notifier with a custom endpoint (tests, proxies).
    pub fn with_endpoint(
        token: impl Into<String>,
        user_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        // A hung notification endpoint must not stall a tool round.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction cannot fail with static options");

        Self {
            token: token.into(),
            user_key: user_key.into(),
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn try_push(&self, message: &str) -> Result<(), NotifyError> {
        let params = [
            ("token", self.token.as_str()),
            ("user", self.user_key.as_str()),
            ("message", message),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::BadStatus(status.as_u16()));
        }

        debug!(message_len = message.len(), "Notification delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn push(&self, message: &str) {
        if let Err(e) = self.try_push(message).await {
            warn!(error = %e, "Notification delivery failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one HTTP request, reply 200, and hand back the raw request.
    async fn capture_one_request(listener: TcpListener) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
                    .and_then(|l| l.split(':').nth(1))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn posts_form_encoded_fields() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(capture_one_request(listener));

        let notifier =
            PushoverNotifier::with_endpoint("app-token", "user-key", format!("http://{addr}/"));
        notifier.push("Recording question about Mars").await;

        let request = server.await.unwrap();
        assert!(request.starts_with("POST"));
        assert!(request.contains("application/x-www-form-urlencoded"));
        assert!(request.contains("token=app-token"));
        assert!(request.contains("user=user-key"));
        assert!(request.contains("message=Recording+question+about+Mars"));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        // Nothing listens here; push must return without panicking.
        let notifier =
            PushoverNotifier::with_endpoint("token", "user", "http://127.0.0.1:9/unreachable");
        notifier.push("lost message").await;
    }

    #[tokio::test]
    async fn non_2xx_is_an_internal_error_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut chunk = [0u8; 2048];
            let _ = socket.read(&mut chunk).await;
            socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let notifier =
            PushoverNotifier::with_endpoint("token", "user", format!("http://{addr}/"));
        let err = notifier.try_push("message").await.unwrap_err();
        assert!(matches!(err, NotifyError::BadStatus(500)));

        // And the public contract swallows it.
        notifier.push("message").await;
    }
}
