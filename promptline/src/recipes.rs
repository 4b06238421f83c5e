//! Ready-made prompts and chains for the assistant, essay, poem, celebrity and RAG sessions.

use indoc::indoc;
use std::sync::Arc;

use crate::{
    chain::{Chain, Step},
    memory::ConversationMemory,
    models::LanguageModel,
    prompt::{PromptTemplate, Role, Variables},
    Result,
};

pub const ESSAY_MODEL: &str = "llama2:latest";
pub const POEM_MODEL: &str = "llama3:latest";
pub const CHAT_MODEL: &str = "llama2:latest";

/// Key the single-step chains store their answer under.
pub const OUTPUT_KEY: &str = "output";

#[must_use]
pub fn assistant_prompt() -> PromptTemplate {
    PromptTemplate::from_messages([
        (
            Role::System,
            "you are helpful assistant. Please response to the user queries",
        ),
        (Role::User, "Question:{question}"),
    ])
}

/// Answers a `{question}` with the helpful assistant persona.
pub fn assistant_chain(model: Arc<dyn LanguageModel>) -> Chain {
    Chain::single(OUTPUT_KEY, assistant_prompt(), model)
}

pub fn essay_chain(model: Arc<dyn LanguageModel>) -> Chain {
    Chain::single(
        OUTPUT_KEY,
        PromptTemplate::from_template("write essay about {topic} in 100 words"),
        model,
    )
}

pub fn poem_chain(model: Arc<dyn LanguageModel>) -> Chain {
    Chain::single(
        OUTPUT_KEY,
        PromptTemplate::from_template("write a poem about {topic} in 100 words"),
        model,
    )
}

/// Sends `{input}` to the model as-is.
pub fn passthrough_chain(model: Arc<dyn LanguageModel>) -> Chain {
    Chain::single(OUTPUT_KEY, PromptTemplate::from_template("{input}"), model)
}

#[must_use]
pub fn rag_prompt() -> PromptTemplate {
    PromptTemplate::from_template(indoc! {"
        Answer to questions based on provided context only.
        please provide most accutate based on the question
        <context>
        {context}
        </context>
        questions:{input}
    "})
}

/// What [`CelebritySearch`] found out about a name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CelebrityProfile {
    pub person: String,
    pub dob: String,
    pub events: String,
}

/// Looks up a person, their date of birth, and world events around it.
/// Every step keeps its own conversation memory across searches.
#[derive(Debug, Clone)]
pub struct CelebritySearch {
    chain: Chain,
    pub person_memory: Arc<ConversationMemory>,
    pub dob_memory: Arc<ConversationMemory>,
    pub events_memory: Arc<ConversationMemory>,
}

impl CelebritySearch {
    /// # Errors
    ///
    /// Only fails if the step definitions are inconsistent.
    pub fn new(model: Arc<dyn LanguageModel>) -> Result<Self> {
        let person_memory = Arc::new(ConversationMemory::new("name", "chat_history"));
        let dob_memory = Arc::new(ConversationMemory::new("person", "chat_history"));
        let events_memory = Arc::new(ConversationMemory::new("dob", "events_history"));

        let chain = Chain::new(vec![
            Step::new(
                "person",
                PromptTemplate::from_template("tell me about {name}"),
                model.clone(),
            )
            .with_memory(person_memory.clone()),
            Step::new(
                "dob",
                PromptTemplate::from_template("when was {person} born?"),
                model.clone(),
            )
            .with_memory(dob_memory.clone()),
            Step::new(
                "events",
                PromptTemplate::from_template(
                    "what was the 5 major events happen around {dob} in the world",
                ),
                model,
            )
            .with_memory(events_memory.clone()),
        ])?;

        Ok(Self {
            chain,
            person_memory,
            dob_memory,
            events_memory,
        })
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.chain = self.chain.verbose(verbose);
        self
    }

    #[must_use]
    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// # Errors
    ///
    /// Returns the first failing step's error, nothing is remembered for that step or later ones.
    pub async fn search(&self, name: &str) -> Result<CelebrityProfile> {
        let mut inputs = Variables::new();
        inputs.insert("name".to_string(), name.to_string());

        let mut outputs = self.chain.run(inputs).await?;
        let mut take = |key: &str| outputs.remove(key).unwrap_or_default();

        Ok(CelebrityProfile {
            person: take("person"),
            dob: take("dob"),
            events: take("events"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::tests::Echo, Error};

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn should_build_assistant_messages() {
        // When
        let messages = assistant_prompt()
            .build(&vars(&[("question", "What is Rust?")]))
            .unwrap();

        // Then
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "Question:What is Rust?");
    }

    #[tokio::test]
    async fn should_fill_topic_into_essay_and_poem() {
        let essay = essay_chain(Echo::new(""));
        let poem = poem_chain(Echo::new(""));

        assert_eq!(essay.input_variables(), ["topic"]);
        assert_eq!(
            essay.invoke(vars(&[("topic", "tides")])).await.unwrap(),
            "write essay about tides in 100 words"
        );
        assert_eq!(
            poem.invoke(vars(&[("topic", "tides")])).await.unwrap(),
            "write a poem about tides in 100 words"
        );
    }

    #[tokio::test]
    async fn should_pass_input_through() {
        let chain = passthrough_chain(Echo::new(""));

        assert_eq!(chain.input_variables(), ["input"]);
        assert_eq!(chain.invoke(vars(&[("input", "hi")])).await.unwrap(), "hi");
    }

    #[test]
    fn should_declare_rag_placeholders() {
        assert_eq!(rag_prompt().input_variables(), ["context", "input"]);
    }

    #[tokio::test]
    async fn should_search_celebrity_in_three_steps() {
        // Given
        let model = Echo::new("");
        let search = CelebritySearch::new(model.clone()).unwrap();

        // When
        let profile = search.search("Ada Lovelace").await.unwrap();

        // Then
        assert_eq!(profile.person, "tell me about Ada Lovelace");
        assert_eq!(profile.dob, "when was tell me about Ada Lovelace born?");
        assert!(profile.events.ends_with("born? in the world"));
        assert_eq!(search.chain().input_variables(), ["name"]);
        assert_eq!(
            search.person_memory.buffer(),
            "Human: Ada Lovelace\nAI: tell me about Ada Lovelace"
        );
        assert_eq!(search.events_memory.len(), 1);
        assert_eq!(search.events_memory.exchanges()[0].input, profile.dob);
    }

    #[tokio::test]
    async fn should_keep_memory_untouched_on_failure() {
        let search = CelebritySearch::new(Arc::new(crate::chain::tests::Failing)).unwrap();

        let result = search.search("Ada Lovelace").await;

        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
        assert!(search.person_memory.is_empty());
        assert!(search.events_memory.is_empty());
    }
}
