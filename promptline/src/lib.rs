#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod chain;
pub mod config;
mod error;
mod memory;
pub mod models;
mod prompt;
pub mod recipes;
pub mod retrieval;
pub mod stream;

pub use chain::{Chain, Step};
pub use config::Config;
pub use error::{Error, Result};
pub use memory::{ConversationMemory, Exchange};
pub use models::{Embedder, LanguageModel, Ollama, OllamaEmbeddings, OpenAI};
pub use prompt::{Message, PromptTemplate, Role, Variables};
pub use retrieval::{
    Document, DocumentSource, LazyRetriever, RetrievalAnswer, RetrievalChain, ScoredChunk,
    TextSplitter,
};
