use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    memory::ConversationMemory,
    models::{with_timeout, LanguageModel},
    prompt::{transcript, PromptTemplate, Variables},
    Error, Result,
};

/// One prompt-fill + model-invoke step. Its output is stored under `output_key`.
#[derive(Clone)]
pub struct Step {
    output_key: String,
    template: PromptTemplate,
    model: Arc<dyn LanguageModel>,
    memory: Option<Arc<ConversationMemory>>,
}

impl Step {
    pub fn new(
        output_key: impl Into<String>,
        template: PromptTemplate,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            output_key: output_key.into(),
            template,
            model,
            memory: None,
        }
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    #[must_use]
    pub const fn template(&self) -> &PromptTemplate {
        &self.template
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("output_key", &self.output_key)
            .field("model", &self.model.name())
            .field("memory", &self.memory.as_ref().map(|m| m.memory_key()))
            .finish_non_exhaustive()
    }
}

/// A strictly linear pipeline of [`Step`]s, executed in declaration order.
#[derive(Debug, Clone)]
pub struct Chain {
    steps: Vec<Step>,
    verbose: bool,
    timeout: Option<Duration>,
}

impl Chain {
    /// # Errors
    ///
    /// Returns [`Error::EmptyChain`] without steps and [`Error::DuplicateOutputKey`] when two
    /// steps write the same variable.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::EmptyChain);
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.output_key.as_str()) {
                return Err(Error::DuplicateOutputKey(step.output_key.clone()));
            }
        }

        Ok(Self {
            steps,
            verbose: false,
            timeout: None,
        })
    }

    /// Builds a chain with a single step.
    pub fn single(
        output_key: impl Into<String>,
        template: PromptTemplate,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            steps: vec![Step::new(output_key, template, model)],
            verbose: false,
            timeout: None,
        }
    }

    /// Logs every filled prompt and output at `info` level.
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
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Variables the caller has to supply: placeholders not produced by an earlier step
    /// and not bound by a step's memory.
    #[must_use]
    pub fn input_variables(&self) -> Vec<String> {
        let mut produced = HashSet::new();
        let mut inputs: Vec<String> = Vec::new();

        for step in &self.steps {
            let memory_key = step.memory.as_ref().map(|m| m.memory_key());
            let memory_input = step.memory.as_ref().map(|m| m.input_key());

            for name in step
                .template
                .input_variables()
                .iter()
                .map(String::as_str)
                .chain(memory_input)
            {
                if Some(name) != memory_key
                    && !produced.contains(name)
                    && !inputs.iter().any(|i| i == name)
                {
                    inputs.push(name.to_string());
                }
            }

            produced.insert(step.output_key.as_str());
        }

        inputs
    }

    /// Runs every step and returns the inputs together with all step outputs.
    ///
    /// # Errors
    ///
    /// The first failing step aborts the chain and its error is returned unchanged.
    pub async fn run(&self, inputs: Variables) -> Result<Variables> {
        let mut variables = inputs;

        for (i, step) in self.steps.iter().enumerate() {
            let output = self.run_step(step, &variables).await.map_err(|err| {
                warn!(
                    step = i,
                    output_key = %step.output_key,
                    "Chain step failed, skipping {} remaining: {err}",
                    self.steps.len() - i - 1
                );
                err
            })?;

            variables.insert(step.output_key.clone(), output);
        }

        Ok(variables)
    }

    /// Runs the chain and returns the last step's output.
    ///
    /// # Errors
    ///
    /// See [`Chain::run`].
    pub async fn invoke(&self, inputs: Variables) -> Result<String> {
        let last = self.steps.last().ok_or(Error::EmptyChain)?.output_key.clone();
        let mut variables = self.run(inputs).await?;

        Ok(variables.remove(&last).unwrap_or_default())
    }

    async fn run_step(&self, step: &Step, variables: &Variables) -> Result<String> {
        let messages = match &step.memory {
            Some(memory) => {
                if !variables.contains_key(memory.input_key()) {
                    return Err(Error::MissingVariable(memory.input_key().to_string()));
                }

                let mut scoped = variables.clone();
                scoped.insert(memory.memory_key().to_string(), memory.buffer());
                step.template.build(&scoped)?
            }
            None => step.template.build(variables)?,
        };

        if self.verbose {
            info!(
                output_key = %step.output_key,
                model = step.model.name(),
                "Prompt after formatting:\n{}",
                transcript(&messages)
            );
        }

        let output =
            with_timeout(step.model.name(), self.timeout, step.model.invoke(&messages)).await?;

        if self.verbose {
            info!(output_key = %step.output_key, "Step output:\n{output}");
        } else {
            debug!(output_key = %step.output_key, "Step finished with {} chars", output.len());
        }

        if let Some(memory) = &step.memory {
            let input = variables.get(memory.input_key()).cloned().unwrap_or_default();
            memory.append(input, output.clone());
        }

        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::prompt::Message;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with the last message content wrapped in a prefix.
    pub struct Echo {
        pub prefix: &'static str,
        pub calls: AtomicUsize,
    }

    impl Echo {
        pub fn new(prefix: &'static str) -> Arc<Self> {
            Arc::new(Self {
                prefix,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, messages: &[Message]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();

            Ok(format!("{}{last}", self.prefix))
        }
    }

    /// Sleeps well past any test deadline.
    pub struct Slow;

    #[async_trait]
    impl LanguageModel for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(&self, _messages: &[Message]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    pub struct Failing;

    #[async_trait]
    impl LanguageModel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(&self, _messages: &[Message]) -> Result<String> {
            Err(Error::BackendUnavailable("model not loaded".to_string()))
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn should_thread_outputs_between_steps() {
        // Given
        let model = Echo::new("");
        let chain = Chain::new(vec![
            Step::new(
                "person",
                PromptTemplate::from_template("tell me about {name}"),
                model.clone(),
            ),
            Step::new(
                "dob",
                PromptTemplate::from_template("when was {person} born?"),
                model.clone(),
            ),
        ])
        .unwrap();

        // When
        let outputs = chain.run(vars(&[("name", "Ada")])).await.unwrap();

        // Then
        assert_eq!(outputs["person"], "tell me about Ada");
        assert_eq!(outputs["dob"], "when was tell me about Ada born?");
        assert_eq!(outputs["name"], "Ada");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn should_abort_on_first_failure() {
        // Given
        let first = Echo::new("a:");
        let last = Echo::new("c:");
        let memory = Arc::new(ConversationMemory::new("b", "history"));
        let chain = Chain::new(vec![
            Step::new("a", PromptTemplate::from_template("{input}"), first.clone()),
            Step::new("b", PromptTemplate::from_template("{a}"), Arc::new(Failing)),
            Step::new("c", PromptTemplate::from_template("{b}"), last.clone())
                .with_memory(memory.clone()),
        ])
        .unwrap();

        // When
        let result = chain.run(vars(&[("input", "x")])).await;

        // Then
        assert_eq!(
            result,
            Err(Error::BackendUnavailable("model not loaded".to_string()))
        );
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(last.calls.load(Ordering::SeqCst), 0);
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn should_not_record_failed_invocations() {
        // Given
        let memory = Arc::new(ConversationMemory::new("name", "chat_history"));
        let chain = Chain::new(vec![Step::new(
            "person",
            PromptTemplate::from_template("tell me about {name}"),
            Arc::new(Failing),
        )
        .with_memory(memory.clone())])
        .unwrap();

        // When
        let result = chain.invoke(vars(&[("name", "Ada")])).await;

        // Then
        assert!(result.is_err());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn should_append_memory_and_expose_history() {
        // Given
        let memory = Arc::new(ConversationMemory::new("name", "chat_history"));
        let chain = Chain::new(vec![Step::new(
            "person",
            PromptTemplate::from_template("{chat_history}|{name}"),
            Echo::new(""),
        )
        .with_memory(memory.clone())])
        .unwrap();

        // When
        let first = chain.invoke(vars(&[("name", "Ada")])).await.unwrap();
        let second = chain.invoke(vars(&[("name", "Alan")])).await.unwrap();

        // Then
        assert_eq!(first, "|Ada");
        assert_eq!(second, "Human: Ada\nAI: |Ada|Alan");
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.exchanges()[1].input, "Alan");
    }

    #[tokio::test]
    async fn should_fail_fast_on_missing_input() {
        // Given
        let model = Echo::new("");
        let chain = Chain::single("text", PromptTemplate::from_template("{topic}"), model.clone());

        // When
        let result = chain.invoke(Variables::new()).await;

        // Then
        assert_eq!(result, Err(Error::MissingVariable("topic".to_string())));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn should_reject_duplicate_output_keys() {
        let model = Echo::new("");
        let result = Chain::new(vec![
            Step::new("out", PromptTemplate::from_template("{a}"), model.clone()),
            Step::new("out", PromptTemplate::from_template("{out}"), model),
        ]);

        assert_eq!(result.unwrap_err(), Error::DuplicateOutputKey("out".to_string()));
    }

    #[test]
    fn should_reject_empty_chain() {
        assert_eq!(Chain::new(Vec::new()).unwrap_err(), Error::EmptyChain);
    }

    #[test]
    fn should_list_caller_supplied_variables() {
        // Given
        let model = Echo::new("");
        let memory = Arc::new(ConversationMemory::new("person", "chat_history"));
        let chain = Chain::new(vec![
            Step::new(
                "person",
                PromptTemplate::from_template("tell me about {name}"),
                model.clone(),
            ),
            Step::new(
                "dob",
                PromptTemplate::from_template("{chat_history} {person} {style}"),
                model,
            )
            .with_memory(memory),
        ])
        .unwrap();

        // Then
        assert_eq!(chain.input_variables(), ["name", "style"]);
    }

    #[tokio::test]
    async fn should_time_out_slow_steps() {
        let chain = Chain::single("out", PromptTemplate::from_template("{q}"), Arc::new(Slow))
            .with_timeout(Some(Duration::from_millis(10)));

        let result = chain.invoke(vars(&[("q", "hi")])).await;

        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    }
}
