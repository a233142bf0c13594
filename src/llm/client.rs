use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::error::LlmError;
use super::types::{ChatMessage, ChatRequest, ChatResponse, Completion, ModelSettings};

pub const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Anything that can turn a list of role-tagged messages into raw completion text.
///
/// The engine only talks to this trait, so tests can script responses without
/// a network.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        settings: &ModelSettings,
    ) -> Result<Completion, LlmError>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// The underlying `reqwest::Client` is built once at process start and shared;
/// the credential may be supplied per call and falls back to `default_api_key`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    default_api_key: Option<String>,
}

impl OpenAiClient {
    /// Create a client for `base_url`: the configured endpoint, or a mock server in tests.
    pub fn with_base_url(
        client: Client,
        default_api_key: Option<String>,
        base_url: String,
    ) -> Self {
        let default_api_key = default_api_key.filter(|k| !k.trim().is_empty());
        Self {
            client,
            base_url,
            default_api_key,
        }
    }

    pub fn has_default_key(&self) -> bool {
        self.default_api_key.is_some()
    }

    fn resolve_key<'a>(&'a self, settings: &'a ModelSettings) -> Result<&'a str, LlmError> {
        settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .or(self.default_api_key.as_deref())
            .ok_or(LlmError::Auth)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        settings: &ModelSettings,
    ) -> Result<Completion, LlmError> {
        let api_key = self.resolve_key(settings)?;
        let model = settings
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or(LlmError::MissingModel)?;

        let req = ChatRequest::build(model, messages, settings);
        debug!(
            model,
            messages = req.messages.len(),
            max_tokens = ?req.max_tokens,
            max_completion_tokens = ?req.max_completion_tokens,
            "calling completion API"
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .header("content-type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::ResponseFormat(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseFormat("response contained no choices".into()))?;
        let content = choice.message.content.unwrap_or_default();

        if choice.finish_reason.as_deref() == Some("length") {
            return Err(LlmError::Truncated {
                partial_len: content.len(),
            });
        }
        if content.trim().is_empty() {
            return Err(LlmError::ResponseFormat(
                "response message had no content".into(),
            ));
        }

        let usage = parsed.usage.unwrap_or_default();
        debug!(total_tokens = usage.total_tokens, "completion received");

        Ok(Completion {
            content,
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, default_key: Option<&str>) -> OpenAiClient {
        OpenAiClient::with_base_url(
            Client::new(),
            default_key.map(str::to_string),
            format!("{}/v1/chat/completions", server.uri()),
        )
    }

    fn settings(model: &str) -> ModelSettings {
        ModelSettings {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    fn ok_body(content: &str, finish_reason: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": finish_reason}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_json_object_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-default"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{\"a\":1}", "stop")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-default"));
        let completion = client
            .complete(vec![ChatMessage::user("hi")], &settings("gpt-4o"))
            .await
            .unwrap();

        assert_eq!(completion.content, "{\"a\":1}");
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn request_key_overrides_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-request"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{}", "stop")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-default"));
        let mut s = settings("gpt-4o");
        s.api_key = Some("sk-request".into());
        client.complete(vec![], &s).await.unwrap();
    }

    #[tokio::test]
    async fn missing_key_is_auth_error() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);
        let err = client
            .complete(vec![], &settings("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth));
    }

    #[tokio::test]
    async fn non_200_is_upstream_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk"));
        let err = client
            .complete(vec![], &settings("gpt-4o"))
            .await
            .unwrap_err();
        match err {
            LlmError::Upstream { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_json_body_is_response_format_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk"));
        let err = client
            .complete(vec![], &settings("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ResponseFormat(_)));
    }

    #[tokio::test]
    async fn length_finish_reason_is_truncation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(ok_body("{\"conversation\": [", "length")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk"));
        let err = client
            .complete(vec![], &settings("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Truncated { partial_len: 18 }));
    }

    #[tokio::test]
    async fn reasoning_model_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "model": "o3-mini",
                "max_completion_tokens": 4000,
                "reasoning_effort": "medium"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{}", "stop")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk"));
        let mut s = settings("o3-mini");
        s.max_tokens = Some(500);
        s.temperature = Some(0.9);
        client.complete(vec![], &s).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let client = OpenAiClient::with_base_url(
            Client::new(),
            Some("sk".into()),
            "http://127.0.0.1:1/v1/chat/completions".into(),
        );
        let err = client
            .complete(vec![], &settings("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
    }
}
