use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use url::Url;

use super::provider::{CompletionProvider, ProgressFn};
use super::sse::decode_stream;
use super::types::{
    CompletionError, CompletionMetadata, CompletionPayload, GenerationOutcome, GenerationRequest,
};
use crate::error::{PluginError, Result};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Connection options for [`CompletionClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL, `/completions` is appended
    pub api_url: String,
    /// Only bounds connection setup; generation itself has no timeout
    pub connect_timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

/// Client for a llama-cpp-python style `/completions` endpoint
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http_client: Client,
    endpoint: String,
}

impl CompletionClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        Url::parse(&options.api_url).map_err(|e| PluginError::InvalidSetting {
            field: "api_url",
            reason: e.to_string(),
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = options.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| PluginError::Runtime(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/completions", options.api_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &GenerationRequest) -> std::result::Result<reqwest::Response, CompletionError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request.to_body())
            .send()
            .await
            .map_err(|e| CompletionError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error_response(status.as_u16(), &text));
        }

        Ok(response)
    }

    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationOutcome, CompletionError> {
        let response = self.send(request).await?;
        let body = response.bytes().await.map_err(|e| CompletionError::Network {
            message: e.to_string(),
        })?;

        let payload: CompletionPayload =
            serde_json::from_slice(&body).map_err(|e| CompletionError::Decode {
                message: e.to_string(),
            })?;

        convert_response(payload)
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        on_progress: ProgressFn<'_>,
    ) -> std::result::Result<GenerationOutcome, CompletionError> {
        let response = self.send(request).await?;
        let mut chunks = std::pin::pin!(decode_stream(Box::pin(response.bytes_stream())));

        let mut text = String::new();
        let mut last_chunk = None;
        let mut chunk_count = 0usize;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            chunk_count += 1;

            if !chunk.text_fragment.is_empty() {
                text.push_str(&chunk.text_fragment);
                on_progress(&chunk.text_fragment);
            }
            last_chunk = Some(chunk);
        }

        tracing::debug!(chunks = chunk_count, chars = text.len(), "Stream finished");

        match last_chunk {
            Some(chunk) if !text.is_empty() => Ok(GenerationOutcome::Success {
                text,
                metadata: CompletionMetadata::from_last_chunk(&chunk),
            }),
            _ => Ok(GenerationOutcome::Empty),
        }
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    fn name(&self) -> &str {
        "llama-cpp"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        on_progress: ProgressFn<'_>,
    ) -> GenerationOutcome {
        tracing::info!(
            endpoint = %self.endpoint,
            stream = request.is_streaming(),
            max_tokens = request.max_tokens(),
            "Sending completion request"
        );

        let result = if request.is_streaming() {
            self.stream(request, on_progress).await
        } else {
            self.complete(request).await
        };

        match result {
            Ok(outcome) => {
                tracing::info!(success = outcome.is_success(), "Completion finished");
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "Completion request failed");
                e.into()
            }
        }
    }
}

fn convert_response(
    payload: CompletionPayload,
) -> std::result::Result<GenerationOutcome, CompletionError> {
    let Some(choice) = payload.choices.into_iter().next() else {
        return Err(CompletionError::Decode {
            message: "response contains no choices".to_string(),
        });
    };

    if choice.text.is_empty() {
        return Ok(GenerationOutcome::Empty);
    }

    Ok(GenerationOutcome::Success {
        text: choice.text,
        metadata: CompletionMetadata {
            id: payload.id,
            model: payload.model,
            created: payload.created,
            object_type: payload.object,
            finish_reason: choice.finish_reason,
            usage: payload.usage,
        },
    })
}

fn parse_error_response(status: u16, body: &str) -> CompletionError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["detail"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "request failed".to_string()
            } else {
                trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
            }
        });

    CompletionError::Transport { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginSettings;
    use crate::llm::types::Usage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(stream: bool) -> GenerationRequest {
        let settings = PluginSettings {
            stream,
            ..Default::default()
        };
        GenerationRequest::new("prompt", &settings)
    }

    async fn client_for_server(server: &MockServer) -> CompletionClient {
        CompletionClient::new(ClientOptions::new(format!("{}/v1/", server.uri()))).unwrap()
    }

    fn sse_body(fragments: &[(&str, Option<&str>)]) -> String {
        let mut body = String::from(": ping\n\n");
        for (text, finish) in fragments {
            let line = json!({
                "id": "cmpl-9",
                "object": "text_completion",
                "created": 42,
                "model": "llama",
                "choices": [{ "text": text, "index": 0, "finish_reason": finish }],
            });
            body.push_str(&format!("data: {}\n\n", line));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn test_endpoint_normalisation() {
        let client = CompletionClient::new(ClientOptions::new("http://localhost:8000/v1/")).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/v1/completions");

        assert!(CompletionClient::new(ClientOptions::new("localhost")).is_err());
    }

    #[test]
    fn test_convert_response_empty_text() {
        let payload: CompletionPayload =
            serde_json::from_value(json!({ "choices": [{ "text": "", "finish_reason": "stop" }] }))
                .unwrap();
        assert_eq!(convert_response(payload).unwrap(), GenerationOutcome::Empty);
    }

    #[test]
    fn test_convert_response_without_choices_is_decode_error() {
        let payload: CompletionPayload = serde_json::from_value(json!({ "id": "x" })).unwrap();
        assert!(matches!(
            convert_response(payload),
            Err(CompletionError::Decode { .. })
        ));
    }

    #[test]
    fn test_parse_error_response() {
        let err = parse_error_response(400, r#"{"error":{"message":"bad prompt"}}"#);
        assert_eq!(
            err,
            CompletionError::Transport {
                status: 400,
                message: "bad prompt".to_string()
            }
        );

        let err = parse_error_response(422, r#"{"detail":"max_tokens too large"}"#);
        assert!(matches!(err, CompletionError::Transport { message, .. } if message == "max_tokens too large"));

        let err = parse_error_response(500, "");
        assert_eq!(err.to_string(), "HTTP 500: request failed");
    }

    #[tokio::test]
    async fn test_whole_response_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(body_partial_json(json!({ "prompt": "prompt", "stream": false, "stop": ["###"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "x",
                "object": "completion",
                "created": 1,
                "model": "m",
                "choices": [{ "text": "Hello", "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        let mut progress = Vec::new();
        let outcome = client
            .generate(&request(false), &mut |f: &str| progress.push(f.to_string()))
            .await;

        assert!(progress.is_empty());
        assert_eq!(
            outcome,
            GenerationOutcome::Success {
                text: "Hello".to_string(),
                metadata: CompletionMetadata {
                    id: "x".to_string(),
                    model: "m".to_string(),
                    created: 1,
                    object_type: "completion".to_string(),
                    finish_reason: Some("stop".to_string()),
                    usage: Some(Usage {
                        prompt_tokens: 3,
                        completion_tokens: 2,
                        total_tokens: 5
                    }),
                },
            }
        );
    }

    #[tokio::test]
    async fn test_whole_response_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "text": "", "finish_reason": "length" }]
            })))
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        let outcome = client.generate(&request(false), &mut |_: &str| {}).await;
        assert_eq!(outcome, GenerationOutcome::Empty);
    }

    #[tokio::test]
    async fn test_whole_response_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        let outcome = client.generate(&request(false), &mut |_: &str| {}).await;
        assert!(matches!(outcome, GenerationOutcome::Failure(msg) if msg.starts_with("Decode error")));
    }

    #[tokio::test]
    async fn test_streamed_response_accumulates_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&[("Hel", None), ("lo", None), ("", Some("stop"))])),
            )
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        let mut progress = Vec::new();
        let outcome = client
            .generate(&request(true), &mut |f: &str| progress.push(f.to_string()))
            .await;

        assert_eq!(progress, vec!["Hel".to_string(), "lo".to_string()]);
        match outcome {
            GenerationOutcome::Success { text, metadata } => {
                assert_eq!(text, "Hello");
                assert_eq!(metadata.finish_reason.as_deref(), Some("stop"));
                assert_eq!(metadata.model, "llama");
                assert_eq!(metadata.created, 42);
                assert!(metadata.usage.is_none());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streamed_response_without_text_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(": only comments\n\n"))
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        let outcome = client.generate(&request(true), &mut |_: &str| {}).await;
        assert_eq!(outcome, GenerationOutcome::Empty);
    }

    #[tokio::test]
    async fn test_streamed_decode_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "{}data: {{broken\n\n",
                sse_body(&[("partial", None)]).replace("data: [DONE]\n\n", "")
            )))
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        let mut progress = Vec::new();
        let outcome = client
            .generate(&request(true), &mut |f: &str| progress.push(f.to_string()))
            .await;

        assert_eq!(progress, vec!["partial".to_string()]);
        assert!(matches!(outcome, GenerationOutcome::Failure(msg) if msg.contains("malformed stream event")));
    }

    #[tokio::test]
    async fn test_http_error_is_failure_for_both_modes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let client = client_for_server(&server).await;
        for stream in [false, true] {
            let outcome = client.generate(&request(stream), &mut |_: &str| {}).await;
            assert_eq!(
                outcome,
                GenerationOutcome::Failure("HTTP 500: internal error".to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        // Nothing listens on a port whose listener was just dropped
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            CompletionClient::new(ClientOptions::new(format!("http://{}/v1", addr))).unwrap();
        let outcome = client.generate(&request(false), &mut |_: &str| {}).await;
        assert!(matches!(outcome, GenerationOutcome::Failure(msg) if msg.starts_with("Network error")));
    }
}
