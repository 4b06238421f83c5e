#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use futures::{pin_mut, TryStreamExt};
use std::{io, process, sync::Arc, time::Duration};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use loader::WebLoader;
use promptline::{
    recipes::{self, CelebritySearch},
    retrieval::DEFAULT_TOP_K,
    stream::{ask, PartialResult},
    Config, LanguageModel, LazyRetriever, Ollama, OllamaEmbeddings, OpenAI, RetrievalChain,
    ScoredChunk, Variables,
};

mod repl;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask the helpful assistant questions
    Chat {
        #[arg(long, value_enum, default_value_t = Backend::Openai)]
        backend: Backend,
    },
    /// Look up a person, their birth date and world events around it
    Celebrity,
    /// Answer questions from a web page
    Rag {
        /// Page to index, defaults to $RAG_SOURCE_URL
        #[arg(long)]
        url: Option<String>,
        #[arg(short, default_value_t = DEFAULT_TOP_K)]
        k: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Openai,
    Ollama,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cli=info,promptline=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = Config::from_env();

    if let Err(err) = run(cli.command, &config).await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Chat { backend } => {
            let model: Arc<dyn LanguageModel> = match backend {
                Backend::Openai => Arc::new(OpenAI::from_config(config)?),
                Backend::Ollama => Arc::new(Ollama::from_config(config, recipes::CHAT_MODEL)),
            };
            let chain = Arc::new(recipes::assistant_chain(model).verbose(config.chain_tracing));

            session("search the topic you want: ", |question| {
                let chain = chain.clone();
                async move {
                    chain
                        .invoke(Variables::from([("question".to_string(), question)]))
                        .await
                }
            })
            .await
        }
        Commands::Celebrity => {
            let model = Arc::new(Ollama::from_config(config, recipes::CHAT_MODEL));
            let search = Arc::new(CelebritySearch::new(model)?.verbose(config.chain_tracing));

            session("search the topic you want to: ", |name| {
                let search = search.clone();
                async move {
                    let profile = search.search(&name).await?;

                    Ok::<_, promptline::Error>(format!(
                        "person:\n{}\n\ndob:\n{}\n\nevents:\n{}\n\n\
                         --- person name ---\n{}\n\n--- major events ---\n{}",
                        profile.person,
                        profile.dob,
                        profile.events,
                        search.person_memory.buffer(),
                        search.events_memory.buffer()
                    ))
                }
            })
            .await
        }
        Commands::Rag { url, k } => {
            let model = Arc::new(OpenAI::groq_from_config(config)?);
            let url = url.unwrap_or_else(|| config.source_url.clone());

            let source = WebLoader::new(
                &[&url],
                &loader::Config {
                    timeout: config.request_timeout.or(Some(Duration::from_secs(30))),
                    ..loader::Config::default()
                },
            )?;
            let retriever = Arc::new(
                LazyRetriever::new(
                    Arc::new(source),
                    Arc::new(OllamaEmbeddings::from_config(config)),
                )
                .with_k(k),
            );

            info!("Building index from {url}");
            let index_size = retriever.get().await?.index().len();
            info!("Indexed {index_size} chunks");

            let chain = Arc::new(
                RetrievalChain::new(retriever, model, recipes::rag_prompt())
                    .verbose(config.chain_tracing)
                    .with_timeout(config.request_timeout),
            );

            session("Enter your prompt here: ", |query| answer_with_sources(chain.clone(), query))
                .await
        }
    }
}

async fn session<F, Fut, E>(prompt: &str, handle: F) -> Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<String, E>>,
    E: std::fmt::Display,
{
    repl::run(
        BufReader::new(tokio::io::stdin()),
        &mut io::stdout(),
        prompt,
        handle,
    )
    .await
}

async fn answer_with_sources(
    chain: Arc<RetrievalChain>,
    query: String,
) -> promptline::Result<String> {
    let events = ask(chain, query);
    pin_mut!(events);

    let mut output = String::new();
    while let Some(event) = events.try_next().await? {
        match event {
            PartialResult::References(chunks) => output.push_str(&format_sources(&chunks)),
            PartialResult::Answer(answer) => output.push_str(&answer),
        }
    }

    Ok(output)
}

fn format_sources(chunks: &[ScoredChunk]) -> String {
    let mut sources = String::from("sources:\n");
    for (i, scored) in chunks.iter().enumerate() {
        let preview: String = scored.chunk.text.chars().take(80).collect();
        sources.push_str(&format!(
            "  [{}] {} #{} ({:.3}) {}\n",
            i + 1,
            scored.chunk.source,
            scored.chunk.index,
            scored.score,
            preview.replace('\n', " ")
        ));
    }
    sources.push('\n');

    sources
}
