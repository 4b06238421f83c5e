use std::sync::{Mutex, MutexGuard};

/// One recorded `(input, output)` pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Exchange {
    pub input: String,
    pub output: String,
}

/// Append-only conversation history attached to a chain step.
///
/// `input_key` names the step variable recorded as the human turn. `memory_key` is the
/// variable under which the rendered history is offered to the step's template.
#[derive(Debug)]
pub struct ConversationMemory {
    input_key: String,
    memory_key: String,
    exchanges: Mutex<Vec<Exchange>>,
}

impl ConversationMemory {
    pub fn new(input_key: impl Into<String>, memory_key: impl Into<String>) -> Self {
        Self {
            input_key: input_key.into(),
            memory_key: memory_key.into(),
            exchanges: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn input_key(&self) -> &str {
        &self.input_key
    }

    #[must_use]
    pub fn memory_key(&self) -> &str {
        &self.memory_key
    }

    pub fn append(&self, input: impl Into<String>, output: impl Into<String>) {
        self.lock().push(Exchange {
            input: input.into(),
            output: output.into(),
        });
    }

    #[must_use]
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().clone()
    }

    /// Renders the history as alternating `Human:` / `AI:` lines.
    #[must_use]
    pub fn buffer(&self) -> String {
        self.lock()
            .iter()
            .map(|e| format!("Human: {}\nAI: {}", e.input, e.output))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A poisoned lock still holds a consistent Vec, every write is a single push.
    fn lock(&self) -> MutexGuard<'_, Vec<Exchange>> {
        self.exchanges
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
