use async_fn_stream::try_fn_stream;
use futures::Stream;
use std::sync::Arc;

use crate::{
    retrieval::{RetrievalChain, ScoredChunk},
    Error,
};

/// Progress of a retrieval-augmented answer.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialResult {
    References(Vec<ScoredChunk>),
    Answer(String),
}

impl From<String> for PartialResult {
    fn from(answer: String) -> Self {
        Self::Answer(answer)
    }
}

impl From<&Vec<ScoredChunk>> for PartialResult {
    fn from(results: &Vec<ScoredChunk>) -> Self {
        Self::References(results.clone())
    }
}

/// Retrieves context for `query` and answers it, emitting the references before the answer.
pub fn ask(
    chain: Arc<RetrievalChain>,
    query: String,
) -> impl Stream<Item = Result<PartialResult, Error>> {
    try_fn_stream(|emitter| async move {
        let results = chain.retrieve(&query).await?;
        emitter.emit((&results).into()).await;

        let answer = chain.answer(&query, &results).await?;
        emitter.emit(answer.into()).await;

        Ok(())
    })
}
