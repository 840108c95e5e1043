use crate::domain::model::{Credentials, Payload};
use crate::domain::ports::{Transport, TransportResponse};
use crate::utils::error::{ConvertError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// POSTs payloads with HTTP basic authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    content_type: String,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            content_type: XML_CONTENT_TYPE.to_string(),
        }
    }

    /// The timeout applies to each request as a whole. `None` leaves the client default.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            content_type: XML_CONTENT_TYPE.to_string(),
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        payload: &Payload,
    ) -> std::result::Result<TransportResponse, ConvertError> {
        let response = self
            .client
            .post(endpoint)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .header(CONTENT_TYPE, self.content_type.as_str())
            .body(payload.body.clone())
            .send()
            .await
            .map_err(|e| ConvertError::Transport {
                message: describe_send_error(endpoint, &e),
            })?;

        // Once a status line has arrived the record keeps it, even if the body is lost.
        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    "⚠️ {} answered {} but the body could not be read: {}",
                    endpoint,
                    status_code,
                    e
                );
                format!("response body unreadable: {}", e)
            }
        };
        tracing::debug!("📡 {} answered {} ({} bytes)", endpoint, status_code, body.len());

        Ok(TransportResponse { status_code, body })
    }
}

fn describe_send_error(endpoint: &str, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request to {} timed out", endpoint)
    } else if error.is_connect() {
        format!("could not connect to {}: {}", endpoint, error)
    } else {
        format!("request to {} failed: {}", endpoint, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_submit_posts_xml_with_basic_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ws/Human_Resources")
                // user:pass
                .header("authorization", "Basic dXNlcjpwYXNz")
                .header("content-type", XML_CONTENT_TYPE)
                .body("<Dept>Finance</Dept>");
            then.status(200).body("<ok/>");
        });

        let transport = HttpTransport::new();
        let response = transport
            .submit(
                &server.url("/ws/Human_Resources"),
                &Credentials::new("user", "pass"),
                &Payload {
                    body: "<Dept>Finance</Dept>".to_string(),
                },
            )
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "<ok/>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ws");
            then.status(500).body("<Fault>bad data</Fault>");
        });

        let response = HttpTransport::new()
            .submit(
                &server.url("/ws"),
                &Credentials::new("user", "pass"),
                &Payload {
                    body: "<x/>".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "<Fault>bad data</Fault>");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let transport = HttpTransport::with_timeout(Some(Duration::from_secs(2))).unwrap();
        let result = transport
            .submit(
                "http://127.0.0.1:1/ws",
                &Credentials::new("user", "pass"),
                &Payload {
                    body: "<x/>".to_string(),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(ConvertError::Transport { message })
                if message.starts_with("could not connect to http://127.0.0.1:1/ws")
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_keeps_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 100\r\n\r\n<Fault>")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let response = HttpTransport::new()
            .submit(
                &format!("http://{}/ws", address),
                &Credentials::new("user", "pass"),
                &Payload {
                    body: "<x/>".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.status_code, 502);
        assert!(response.body.starts_with("response body unreadable"));
    }
}
