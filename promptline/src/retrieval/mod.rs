mod index;
mod splitter;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use std::{sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    models::{with_timeout, Embedder, LanguageModel},
    prompt::{transcript, PromptTemplate, Variables},
    Result,
};

pub use index::{cosine_similarity, ScoredChunk, VectorIndex};
pub use splitter::{Chunk, TextSplitter};

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_EMBED_CONCURRENCY: usize = 8;
const DOCUMENT_SEPARATOR: &str = "\n\n";

/// A raw document fetched from a source, before splitting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub source: String,
    pub content: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// Anything that can produce the documents an index is built from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// # Errors
    ///
    /// Fails with [`crate::Error::SourceUnreachable`] when the documents cannot be fetched.
    async fn load(&self) -> Result<Vec<Document>>;
}

#[async_trait]
impl DocumentSource for Vec<Document> {
    async fn load(&self) -> Result<Vec<Document>> {
        Ok(self.clone())
    }
}

/// Loads, splits and embeds every document, then indexes the vectors.
///
/// Chunks are embedded with at most `concurrency` requests in flight. Any failure
/// aborts the build, no partial index is returned.
///
/// # Errors
///
/// Propagates the source's and the embedder's errors.
pub async fn build_index(
    source: &dyn DocumentSource,
    splitter: &TextSplitter,
    embedder: &dyn Embedder,
    concurrency: usize,
) -> Result<VectorIndex> {
    let documents = source.load().await?;
    let chunks = splitter.split(&documents);
    info!(
        "Loaded {} documents, split into {} chunks",
        documents.len(),
        chunks.len()
    );

    let vectors: Vec<Vec<f32>> = stream::iter(chunks.iter())
        .map(|chunk| embedder.embed(&chunk.text))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    debug!("Embedded {} chunks", vectors.len());

    VectorIndex::new(chunks, vectors)
}

/// Answers queries against a built index, embedding them with the index's embedder.
pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    k: usize,
}

impl Retriever {
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            k: DEFAULT_TOP_K,
        }
    }

    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub const fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Returns at most `k` chunks ranked by similarity to `query`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::EmbeddingFailure`] if the query cannot be embedded.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed(query).await?;

        Ok(self.index.top_k(&query, self.k))
    }
}

/// A retriever whose index is built on first use, exactly once.
///
/// Concurrent first callers wait on the same build. A failed build is returned to every
/// waiting caller and attempted again on the next call.
pub struct LazyRetriever {
    cell: OnceCell<Retriever>,
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    k: usize,
    concurrency: usize,
}

impl LazyRetriever {
    pub fn new(source: Arc<dyn DocumentSource>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            cell: OnceCell::new(),
            source,
            embedder,
            splitter: TextSplitter::default(),
            k: DEFAULT_TOP_K,
            concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Returns the retriever, building the index if this is the first call.
    ///
    /// # Errors
    ///
    /// Propagates load and embedding failures from the build.
    pub async fn get(&self) -> Result<&Retriever> {
        self.cell
            .get_or_try_init(|| async {
                info!("Building document index");
                let index = build_index(
                    self.source.as_ref(),
                    &self.splitter,
                    self.embedder.as_ref(),
                    self.concurrency,
                )
                .await?;
                info!("Document index ready with {} chunks", index.len());

                Ok::<_, crate::Error>(Retriever::new(index, self.embedder.clone()).with_k(self.k))
            })
            .await
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.cell.initialized()
    }

    /// # Errors
    ///
    /// See [`LazyRetriever::get`] and [`Retriever::retrieve`].
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.get().await?.retrieve(query).await
    }
}

/// The generated answer together with the chunks it was conditioned on.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RetrievalAnswer {
    pub answer: String,
    pub context: Vec<ScoredChunk>,
}

/// Retrieves context for a query, stuffs it into `{context}` and asks the model.
/// The query itself fills `{input}`.
pub struct RetrievalChain {
    retriever: Arc<LazyRetriever>,
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    verbose: bool,
    timeout: Option<Duration>,
}

impl RetrievalChain {
    pub fn new(
        retriever: Arc<LazyRetriever>,
        model: Arc<dyn LanguageModel>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            retriever,
            model,
            template,
            verbose: false,
            timeout: None,
        }
    }

    /// Logs the filled prompt and the answer at `info` level.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn retriever(&self) -> &LazyRetriever {
        &self.retriever
    }

    /// # Errors
    ///
    /// Propagates retrieval, prompt and model failures.
    pub async fn invoke(&self, input: &str) -> Result<RetrievalAnswer> {
        let context = self.retrieve(input).await?;
        let answer = self.answer(input, &context).await?;

        Ok(RetrievalAnswer { answer, context })
    }

    /// # Errors
    ///
    /// See [`LazyRetriever::retrieve`].
    pub async fn retrieve(&self, input: &str) -> Result<Vec<ScoredChunk>> {
        self.retriever.retrieve(input).await
    }

    /// Generates an answer from already retrieved context.
    ///
    /// # Errors
    ///
    /// Propagates prompt and model failures.
    pub async fn answer(&self, input: &str, context: &[ScoredChunk]) -> Result<String> {
        let mut variables = Variables::new();
        variables.insert("input".to_string(), input.to_string());
        variables.insert("context".to_string(), stuff(context));

        let messages = self.template.build(&variables)?;
        if self.verbose {
            info!(
                model = self.model.name(),
                chunks = context.len(),
                "Prompt after formatting:\n{}",
                transcript(&messages)
            );
        }

        let answer =
            with_timeout(self.model.name(), self.timeout, self.model.invoke(&messages)).await?;

        if self.verbose {
            info!("Answer:\n{answer}");
        }

        Ok(answer)
    }
}

fn stuff(context: &[ScoredChunk]) -> String {
    context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}
