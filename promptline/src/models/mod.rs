mod ollama;
mod openai;

use async_trait::async_trait;
use std::{future::Future, time::Duration};

use crate::{prompt::Message, Error, Result};

pub use ollama::{Ollama, OllamaEmbeddings};
pub use openai::OpenAI;

/// A backend that turns a message sequence into generated text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human readable identifier used in logs and errors.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Fails with [`Error::BackendUnavailable`] or [`Error::AuthenticationFailed`].
    async fn invoke(&self, messages: &[Message]) -> Result<String>;
}

/// A backend that maps text to a vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// # Errors
    ///
    /// Fails with [`Error::EmbeddingFailure`] when the backend cannot produce a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Runs `call` under an optional deadline, reporting overruns as an unavailable backend.
pub(crate) async fn with_timeout<T>(
    name: &str,
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    let Some(timeout) = timeout else {
        return call.await;
    };

    tokio::time::timeout(timeout, call).await.map_err(|_| {
        Error::BackendUnavailable(format!("{name} did not respond within {timeout:?}"))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_report_timeouts_as_unavailable() {
        // When
        let result = with_timeout("slow-model", Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late")
        })
        .await;

        // Then
        assert!(
            matches!(result, Err(Error::BackendUnavailable(msg)) if msg.contains("slow-model"))
        );
    }

    #[tokio::test]
    async fn should_pass_through_without_deadline() {
        let result = with_timeout("fast-model", None, async { Ok(42) }).await;

        assert_eq!(result, Ok(42));
    }
}
