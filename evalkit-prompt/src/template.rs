use std::collections::HashMap;

use evalkit_core::EvalError;
use regex::Regex;

/// A text template with `$name` / `${name}` placeholders.
///
/// Substitution is safe: placeholders with no value, and a lone `$`, are kept
/// verbatim. `$$` renders as a literal `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTemplate {
    template: String,
}

impl TextTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String, EvalError> {
        let pattern = Regex::new(r"\$(?:(\$)|([_A-Za-z][_A-Za-z0-9]*)|\{([_A-Za-z][_A-Za-z0-9]*)\})")
            .map_err(|e| EvalError::InvalidConfig(e.to_string()))?;
        let rendered = pattern.replace_all(&self.template, |caps: &regex::Captures| {
            if caps.get(1).is_some() {
                return "$".to_string();
            }
            let key = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match vars.get(key) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        });
        Ok(rendered.into_owned())
    }
}
