use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
        Role as OpenAIRole,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{with_timeout, Embedder, LanguageModel};
use crate::{
    prompt::{Message, Role},
    Config, Error, Result,
};

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Hosted chat backend speaking the OpenAI wire protocol.
///
/// Groq exposes the same protocol under a different base URL, see [`OpenAI::groq`].
#[derive(Clone)]
pub struct OpenAI {
    client: Arc<Client>,
    model: String,
    name: String,
    temperature: Option<f32>,
    timeout: Option<Duration>,
}

impl OpenAI {
    /// Creates a client for the OpenAI API. Rate-limited calls are not retried unless
    /// [`OpenAI::with_retry_window`] is used.
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        let model = model.into();

        Self {
            client: Arc::new(
                Client::new()
                    .with_api_key(api_key)
                    .with_backoff(backoff(Duration::ZERO)),
            ),
            name: format!("openai:{model}"),
            model,
            temperature: None,
            timeout: None,
        }
    }

    pub fn groq(api_key: &str, model: impl Into<String>) -> Self {
        let model = model.into();

        Self {
            client: Arc::new(
                Client::new()
                    .with_api_key(api_key)
                    .with_api_base(GROQ_API_BASE)
                    .with_backoff(backoff(Duration::ZERO)),
            ),
            name: format!("groq:{model}"),
            model,
            temperature: None,
            timeout: None,
        }
    }

    /// Builds the OpenAI chat backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if `$OPENAI_API_KEY` is not set.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.openai_api_key()?, &config.openai_model)
            .with_retry_window(config.retry_window)
            .with_timeout(config.request_timeout))
    }

    /// Builds the Groq chat backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if `$GROQ_API_KEY` is not set.
    pub fn groq_from_config(config: &Config) -> Result<Self> {
        Ok(Self::groq(config.groq_api_key()?, &config.groq_model)
            .with_retry_window(config.retry_window)
            .with_timeout(config.request_timeout))
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries rate-limited requests with exponential backoff for at most `window`.
    #[must_use]
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        let client = (*self.client).clone().with_backoff(backoff(window));
        self.client = Arc::new(client);
        self
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let messages = messages
            .iter()
            .map(|m| ChatCompletionRequestMessage {
                role: into_openai_role(m.role),
                content: m.content.clone(),
                name: None,
            })
            .collect::<Vec<_>>();

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages);
        if let Some(temperature) = self.temperature {
            request.temperature(temperature);
        }
        let request = request
            .build()
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify(&self.name, e))?;

        debug!("{} answered with {} choices", self.name, response.choices.len());

        Ok(response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::BackendUnavailable(format!("{} returned no completion", self.name))
            })?
            .message
            .content)
    }
}

#[async_trait]
impl LanguageModel for OpenAI {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, messages: &[Message]) -> Result<String> {
        with_timeout(&self.name, self.timeout, self.complete(messages)).await
    }
}

#[async_trait]
impl Embedder for OpenAI {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(EMBEDDING_MODEL)
            .input(text)
            .build()
            .map_err(|e| Error::EmbeddingFailure(e.to_string()))?;

        let call = async {
            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| Error::EmbeddingFailure(classify(&self.name, e).to_string()))?;

            Ok(response
                .data
                .into_iter()
                .next()
                .ok_or_else(|| Error::EmbeddingFailure("Could not find embedding".to_string()))?
                .embedding)
        };

        with_timeout(&self.name, self.timeout, call)
            .await
            .map_err(|e| match e {
                Error::BackendUnavailable(msg) => Error::EmbeddingFailure(msg),
                e => e,
            })
    }
}

fn backoff(window: Duration) -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(window))
        .build()
}

const fn into_openai_role(role: Role) -> OpenAIRole {
    match role {
        Role::System => OpenAIRole::System,
        Role::User => OpenAIRole::User,
        Role::Assistant => OpenAIRole::Assistant,
    }
}

fn classify(name: &str, error: OpenAIError) -> Error {
    match error {
        OpenAIError::ApiError(err) if is_auth_message(&err.message) => {
            Error::AuthenticationFailed(format!("{name}: {}", err.message))
        }
        OpenAIError::Reqwest(err)
            if err
                .status()
                .is_some_and(|s| s.as_u16() == 401 || s.as_u16() == 403) =>
        {
            Error::AuthenticationFailed(format!("{name}: {err}"))
        }
        OpenAIError::ApiError(err) => Error::BackendUnavailable(format!("{name}: {}", err.message)),
        err => Error::BackendUnavailable(format!("{name}: {err}")),
    }
}

fn is_auth_message(message: &str) -> bool {
    let message = message.to_lowercase();

    ["api key", "unauthorized", "authentication"]
        .iter()
        .any(|needle| message.contains(needle))
}
