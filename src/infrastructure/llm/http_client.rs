use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

use crate::domain::DomainError;

/// Stream type for HTTP responses
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DomainError>> + Send>>;

/// Stream of SSE `data:` payloads
pub type SseDataStream = Pin<Box<dyn Stream<Item = Result<String, DomainError>> + Send>>;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, DomainError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    async fn send(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, DomainError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::provider("http", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(DomainError::upstream("http", status.as_u16(), error_body));
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        self.send(url, headers, body)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::provider("http", format!("Failed to parse response: {}", e)))
    }

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, DomainError> {
        let response = self.send(url, headers, body).await?;

        let stream = response.bytes_stream().map(|result| {
            result.map_err(|e| DomainError::provider("http", format!("Stream error: {}", e)))
        });

        Ok(Box::pin(stream))
    }
}

/// Reassembles complete lines across chunk boundaries and yields the payload
/// of every `data:` line. Other SSE fields are dropped.
pub fn sse_data_lines(bytes: ByteStream) -> SseDataStream {
    let lines = bytes.scan(Vec::<u8>::new(), |buffer, chunk| {
        let out: Vec<Result<String, DomainError>> = match chunk {
            Ok(chunk) => {
                buffer.extend_from_slice(&chunk);
                let mut out = Vec::new();

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim_end_matches(['\r', '\n']);

                    if let Some(data) = line.strip_prefix("data:") {
                        out.push(Ok(data.trim_start().to_string()));
                    }
                }
                out
            }
            Err(e) => vec![Err(e)],
        };

        futures::future::ready(Some(out))
    });

    Box::pin(lines.flat_map(stream::iter))
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_json_success() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v1/chat/completions"))
            .and(matchers::header("Authorization", "Bearer key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/v1/chat/completions", server.uri());
        let response = client
            .post_json(&url, vec![("Authorization", "Bearer key")], &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(response["ok"], true);
    }

    #[tokio::test]
    async fn test_post_json_maps_status() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let err = client
            .post_json(&server.uri(), vec![], &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(529));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_post_json_stream_maps_status() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let result = client
            .post_json_stream(&server.uri(), vec![], &serde_json::json!({}))
            .await;

        let Err(err) = result else {
            panic!("expected an error");
        };
        assert_eq!(err.status_code(), Some(401));
    }

    #[tokio::test]
    async fn test_sse_data_lines_across_chunks() {
        let chunks = vec![
            Ok(Bytes::from("event: ping\ndata: {\"a\"")),
            Ok(Bytes::from(":1}\r\n\ndata: [DONE]\n")),
        ];
        let lines: Vec<_> = sse_data_lines(Box::pin(stream::iter(chunks)))
            .collect()
            .await;

        let lines: Vec<String> = lines.into_iter().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[tokio::test]
    async fn test_sse_data_lines_forwards_errors() {
        let chunks = vec![
            Ok(Bytes::from("data: one\n")),
            Err(DomainError::provider("http", "reset")),
        ];
        let lines: Vec<_> = sse_data_lines(Box::pin(stream::iter(chunks)))
            .collect()
            .await;

        assert_eq!(lines.len(), 2);
        assert!(lines[1].is_err());
    }
}
