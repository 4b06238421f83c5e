use promptline::{recipes, Chain, Config, Ollama, OpenAI, Result};
use std::{collections::HashMap, sync::Arc};

/// Chains exposed over HTTP, keyed by their route name.
#[derive(Debug)]
pub struct State {
    pub chains: HashMap<String, Arc<Chain>>,
}

#[allow(clippy::module_name_repetitions)]
pub type AppState = Arc<State>;

/// Builds the `openai`, `essay` and `poem` chains.
///
/// # Errors
///
/// Fails if `$OPENAI_API_KEY` is not configured.
pub fn create(config: &Config) -> Result<AppState> {
    let openai = Arc::new(OpenAI::from_config(config)?);
    let essay = Arc::new(Ollama::from_config(config, recipes::ESSAY_MODEL));
    let poem = Arc::new(Ollama::from_config(config, recipes::POEM_MODEL));

    Ok(with_chains(
        [
            ("openai", recipes::passthrough_chain(openai)),
            ("essay", recipes::essay_chain(essay)),
            ("poem", recipes::poem_chain(poem)),
        ]
        .map(|(name, chain)| (name, chain.verbose(config.chain_tracing))),
    ))
}

pub fn with_chains<S: Into<String>>(chains: impl IntoIterator<Item = (S, Chain)>) -> AppState {
    Arc::new(State {
        chains: chains
            .into_iter()
            .map(|(name, chain)| (name.into(), Arc::new(chain)))
            .collect(),
    })
}
