use axum_jsonschema::Json;
use promptline::{Chain, Variables};
use schemars::JsonSchema;
use std::collections::HashMap;
use tracing::info;

use crate::axum::{
    errors::{ApiError, ApiResult},
    extractors::NamedChain,
};

/// Either the full variable map or a bare string for chains with a single input.
#[derive(Debug, serde::Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Input {
    Text(String),
    Variables(HashMap<String, String>),
}

impl Input {
    fn into_variables(self, chain: &Chain) -> ApiResult<Variables> {
        match self {
            Self::Variables(variables) => Ok(variables),
            Self::Text(text) => match chain.input_variables().as_slice() {
                [name] => Ok(Variables::from([(name.clone(), text)])),
                names => Err(ApiError::ClientError(format!(
                    "This chain expects an object with the keys: {}.",
                    names.join(", ")
                ))),
            },
        }
    }
}

#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct InvokeRequest {
    input: Input,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
pub struct InvokeResponse {
    output: String,
}

#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct BatchRequest {
    inputs: Vec<Input>,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
pub struct BatchResponse {
    output: Vec<String>,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
pub struct InputSchema {
    input_variables: Vec<String>,
}

// Run a chain once
pub async fn invoke(
    NamedChain { name, chain }: NamedChain,
    Json(req): Json<InvokeRequest>,
) -> ApiResult<Json<InvokeResponse>> {
    info!(chain = %name, "Invoking chain");
    let inputs = req.input.into_variables(&chain)?;
    let output = chain.invoke(inputs).await?;

    Ok(Json(InvokeResponse { output }))
}

// Run a chain over several inputs, in order, stopping at the first failure
pub async fn batch(
    NamedChain { name, chain }: NamedChain,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    info!(chain = %name, "Invoking chain on {} inputs", req.inputs.len());

    let mut output = Vec::with_capacity(req.inputs.len());
    for input in req.inputs {
        let inputs = input.into_variables(&chain)?;
        output.push(chain.invoke(inputs).await?);
    }

    Ok(Json(BatchResponse { output }))
}

#[allow(clippy::unused_async)]
pub async fn input_schema(NamedChain { chain, .. }: NamedChain) -> Json<InputSchema> {
    Json(InputSchema {
        input_variables: chain.input_variables(),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use promptline::{recipes, LanguageModel, Message, PromptTemplate};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::*;
    use crate::axum::{app::router, state::with_chains};

    struct Shout;

    #[async_trait]
    impl LanguageModel for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        async fn invoke(&self, messages: &[Message]) -> promptline::Result<String> {
            Ok(messages
                .iter()
                .map(|m| m.content.to_uppercase())
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }

    struct Down;

    #[async_trait]
    impl LanguageModel for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn invoke(&self, _messages: &[Message]) -> promptline::Result<String> {
            Err(promptline::Error::BackendUnavailable(
                "ollama:llama3:latest is not loaded".to_string(),
            ))
        }
    }

    fn app() -> Router {
        router(with_chains([
            ("essay", recipes::essay_chain(Arc::new(Shout))),
            ("openai", recipes::passthrough_chain(Arc::new(Down))),
            (
                "pair",
                Chain::single("output", PromptTemplate::from_template("{a} {b}"), Arc::new(Shout)),
            ),
        ]))
    }

    async fn send(method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn invokes_chain_with_variables() {
        // When
        let (status, body) = send(
            "POST",
            "/essay/invoke",
            Some(json!({ "input": { "topic": "tides" } })),
        )
        .await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "output": "WRITE ESSAY ABOUT TIDES IN 100 WORDS" }));
    }

    #[tokio::test]
    async fn binds_plain_text_to_single_variable() {
        let (status, body) = send("POST", "/essay/invoke", Some(json!({ "input": "tides" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "WRITE ESSAY ABOUT TIDES IN 100 WORDS");
    }

    #[tokio::test]
    async fn rejects_plain_text_for_several_variables() {
        let (status, _) = send("POST", "/pair/invoke", Some(json!({ "input": "x" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_missing_variables() {
        let (status, _) =
            send("POST", "/pair/invoke", Some(json!({ "input": { "a": "x" } }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_malformed_bodies() {
        let (status, _) = send("POST", "/essay/invoke", Some(json!({ "input": 42 }))).await;

        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn returns_not_found_for_unknown_chain() {
        let (status, _) = send("POST", "/nope/invoke", Some(json!({ "input": "x" }))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reports_backend_failures_as_bad_gateway() {
        let (status, _) = send("POST", "/openai/invoke", Some(json!({ "input": "hi" }))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn batches_inputs_in_order() {
        // When
        let (status, body) = send(
            "POST",
            "/pair/batch",
            Some(json!({ "inputs": [{ "a": "x", "b": "y" }, { "a": "1", "b": "2" }] })),
        )
        .await;

        // Then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "output": ["X Y", "1 2"] }));
    }

    #[tokio::test]
    async fn stops_batch_at_first_failure() {
        let (status, _) = send(
            "POST",
            "/pair/batch",
            Some(json!({ "inputs": [{ "a": "x", "b": "y" }, { "a": "1" }] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn describes_input_variables() {
        let (status, body) = send("GET", "/pair/input_schema", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "input_variables": ["a", "b"] }));
    }

    #[tokio::test]
    async fn stamps_request_id() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }
}
