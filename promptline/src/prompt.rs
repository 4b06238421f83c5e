use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::{collections::HashMap, fmt::Display};

use crate::{Error, Result};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Named values used to fill a template.
pub type Variables = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "System"),
            Self::User => write!(f, "Human"),
            Self::Assistant => write!(f, "AI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// An ordered list of role-tagged fragments containing `{name}` placeholders.
///
/// `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    fragments: Vec<(Role, String)>,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Creates a template made of a single user message.
    pub fn from_template(template: impl Into<String>) -> Self {
        Self::from_messages([(Role::User, template)])
    }

    pub fn from_messages<S: Into<String>>(messages: impl IntoIterator<Item = (Role, S)>) -> Self {
        let fragments: Vec<(Role, String)> = messages
            .into_iter()
            .map(|(role, text)| (role, text.into()))
            .collect();

        let mut input_variables = Vec::new();
        for (_, text) in &fragments {
            for name in placeholders(text) {
                if !input_variables.iter().any(|v| v == name) {
                    input_variables.push(name.to_string());
                }
            }
        }

        Self {
            fragments,
            input_variables,
        }
    }

    /// Placeholder names in order of first appearance.
    #[must_use]
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Fills every placeholder and returns the resulting messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingVariable`] naming the first placeholder without a value.
    pub fn build(&self, variables: &Variables) -> Result<Vec<Message>> {
        if let Some(missing) = self
            .input_variables
            .iter()
            .find(|name| !variables.contains_key(*name))
        {
            return Err(Error::MissingVariable(missing.clone()));
        }

        Ok(self
            .fragments
            .iter()
            .map(|(role, text)| Message::new(*role, fill(text, variables)))
            .collect())
    }

    /// Renders the filled template as a single transcript, one `Role: content` line per message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingVariable`] naming the first placeholder without a value.
    pub fn format(&self, variables: &Variables) -> Result<String> {
        Ok(transcript(&self.build(variables)?))
    }
}

/// One `Role: content` line per message.
#[must_use]
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn placeholders(text: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

// Single pass, so braces inside substituted values are left alone.
fn fill(text: &str, variables: &Variables) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| match &caps[0] {
            "{{" => "{".to_string(),
            "}}" => "}".to_string(),
            _ => variables.get(&caps[1]).cloned().unwrap_or_default(),
        })
        .into_owned()
}
