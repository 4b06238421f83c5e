use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Embedder, LanguageModel};
use crate::{prompt::Message, Config, Error, Result};

/// Chat backend served by a local Ollama process.
#[derive(Debug, Clone)]
pub struct Ollama {
    client: Client,
    base_url: String,
    model: String,
    name: String,
}

impl Ollama {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self::with_timeout(base_url, model, None)
    }

    pub fn with_timeout(
        base_url: &str,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let model = model.into();

        Self {
            client: build_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            name: format!("ollama:{model}"),
            model,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config, model: impl Into<String>) -> Self {
        Self::with_timeout(&config.ollama_url, model, config.request_timeout)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ChatResponse {
    message: Message,
}

#[async_trait]
impl LanguageModel for Ollama {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, messages: &[Message]) -> Result<String> {
        let response = self
            .client
            .post(&format!("{}/api/chat", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &self.base_url, &e))?;

        let response = check_status(&self.name, response).await?;
        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| {
                Error::BackendUnavailable(format!("{}: malformed response: {e}", self.name))
            })?;

        debug!("{} answered with {} chars", self.name, response.message.content.len());

        Ok(response.message.content)
    }
}

/// Embedding backend served by a local Ollama process.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddings {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddings {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self::with_timeout(base_url, model, None)
    }

    pub fn with_timeout(
        base_url: &str,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::with_timeout(&config.ollama_url, &config.embedding_model, config.request_timeout)
    }
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let name = format!("ollama:{}", self.model);

        let response = self
            .client
            .post(&format!("{}/api/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": text,
            }))
            .send()
            .await
            .map_err(|e| {
                Error::EmbeddingFailure(connection_error(&name, &self.base_url, &e).to_string())
            })?;

        let response = check_status(&name, response)
            .await
            .map_err(|e| Error::EmbeddingFailure(e.to_string()))?;

        let response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailure(format!("{name}: malformed response: {e}")))?;

        if response.embedding.is_empty() {
            return Err(Error::EmbeddingFailure(format!("{name} returned an empty embedding")));
        }

        Ok(response.embedding)
    }
}

fn build_client(timeout: Option<Duration>) -> Client {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().unwrap_or_else(|err| {
        warn!("Failed to configure HTTP client, falling back to defaults without timeout: {err}");
        Client::new()
    })
}

fn connection_error(name: &str, base_url: &str, error: &reqwest::Error) -> Error {
    if error.is_timeout() {
        return Error::BackendUnavailable(format!("{name} timed out: {error}"));
    }

    Error::BackendUnavailable(format!("{name} is unreachable at {base_url}: {error}"))
}

async fn check_status(name: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    let reason = body
        .get("error")
        .and_then(Value::as_str)
        .map_or_else(|| status.to_string(), ToString::to_string);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::AuthenticationFailed(format!("{name}: {reason}"))
        }
        StatusCode::NOT_FOUND => {
            Error::BackendUnavailable(format!("{name} is not loaded: {reason}"))
        }
        _ => Error::BackendUnavailable(format!("{name}: {reason}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    #[test]
    fn should_normalise_base_url() {
        let ollama = Ollama::new("http://localhost:11434/", "llama2:latest");

        assert_eq!(ollama.base_url, "http://localhost:11434");
        assert_eq!(ollama.name(), "ollama:llama2:latest");
    }

    #[test]
    fn should_parse_chat_response() {
        // Given
        let body = r#"{"model":"llama2","message":{"role":"assistant","content":"Hello!"}}"#;

        // When
        let response: ChatResponse = serde_json::from_str(body).unwrap();

        // Then
        assert_eq!(response.message, Message::new(Role::Assistant, "Hello!"));
    }

    #[tokio::test]
    async fn should_report_unreachable_server() {
        // Given
        let ollama = Ollama::new("http://127.0.0.1:9", "llama2");

        // When
        let result = ollama.invoke(&[Message::new(Role::User, "hi")]).await;

        // Then
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn should_report_unreachable_embedding_server() {
        let embeddings = OllamaEmbeddings::new("http://127.0.0.1:9", "llama2");

        let result = embeddings.embed("hello").await;

        assert!(matches!(result, Err(Error::EmbeddingFailure(_))));
    }

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn should_report_unknown_model_as_not_loaded() {
        // When
        let body = r#"{"error":"model 'x' not found"}"#;
        let result = check_status("ollama:x", response(404, body)).await;

        // Then
        assert_eq!(
            result.unwrap_err(),
            Error::BackendUnavailable("ollama:x is not loaded: model 'x' not found".to_string())
        );
    }

    #[tokio::test]
    async fn should_report_rejected_credentials() {
        let unauthorized = check_status("ollama:x", response(401, "")).await;
        let forbidden = check_status("ollama:x", response(403, "")).await;

        assert_eq!(
            unauthorized.unwrap_err(),
            Error::AuthenticationFailed("ollama:x: 401 Unauthorized".to_string())
        );
        assert!(matches!(forbidden, Err(Error::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn should_report_server_errors_as_unavailable() {
        let result = check_status("ollama:x", response(500, r#"{"error":"out of memory"}"#)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::BackendUnavailable("ollama:x: out of memory".to_string())
        );
    }

    #[tokio::test]
    async fn should_pass_successful_responses_through() {
        let result = check_status("ollama:x", response(200, r#"{"embedding":[0.5]}"#)).await;

        let body: EmbeddingResponse = result.unwrap().json().await.unwrap();
        assert_eq!(body.embedding, [0.5]);
    }
}
