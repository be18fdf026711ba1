use std::collections::HashMap;
use std::path::Path;

use evalkit_core::{ChatMessage, EvalError, Prompt, Role};
use serde::{Deserialize, Serialize};

use crate::TextTemplate;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageTemplate {
    pub role: Role,
    pub content: String,
}

impl MessageTemplate {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn format(&self, vars: &HashMap<String, String>) -> Result<ChatMessage, EvalError> {
        let content = TextTemplate::new(self.content.as_str()).render(vars)?;
        Ok(ChatMessage::new(self.role, content))
    }
}

/// An ordered list of message templates, rendered into a [`Prompt`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptTemplate {
    /// Free-form label for the prompting method, e.g. `zero_shot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub messages: Vec<MessageTemplate>,
}

impl PromptTemplate {
    pub fn new(messages: Vec<MessageTemplate>) -> Self {
        Self {
            method: None,
            messages,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn format(&self, vars: &HashMap<String, String>) -> Result<Prompt, EvalError> {
        let messages = self
            .messages
            .iter()
            .map(|message| message.format(vars))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Prompt::new(messages))
    }

    pub fn from_json_str(input: &str) -> Result<Self, EvalError> {
        Ok(serde_json::from_str(input)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(input: &str) -> Result<Self, EvalError> {
        serde_yaml::from_str(input).map_err(|e| EvalError::InvalidConfig(e.to_string()))
    }

    /// Loads a template, picking the format from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            #[cfg(feature = "yaml")]
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(EvalError::InvalidConfig(format!(
                "unsupported prompt template format: {}",
                path.display()
            ))),
        }
    }
}
