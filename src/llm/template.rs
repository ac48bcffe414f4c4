//! `{{name}}` template rendering for prompts and the metadata block

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{CompletionMetadata, GenerationRequest};

/// Instruction wrapper sent to the model around the node text
pub const PROMPT_TEMPLATE: &str = "\n\n### Instructions: {{text}}\n\n### Response:\n";

pub const METADATA_TEMPLATE: &str = r#"

```yaml
metadata:
- id: "{{id}}"
- finish_reason: "{{finish_reason}}"
- object_type: "{{object_type}}"
- created: "{{created}}"
- prompt_template: "{{prompt_template}}"
- prompt_text: "{{prompt_text}}"
- model: "{{model}}"
- temperature: {{temperature}}
- top_p: {{top_p}}
- top_k: {{top_k}}
```
"#;

/// Appended after the metadata block when the response reported usage
pub const USAGE_TEMPLATE: &str = r#"```yaml
usage:
- prompt_tokens: {{prompt_tokens}}
- completion_tokens: {{completion_tokens}}
- total_tokens: {{total_tokens}}
```
"#;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(\w*)\}\}").unwrap());

/// Named values substituted into a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Display) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Replace every `{{name}}` with its value, unknown names with nothing
pub fn render(template: &str, context: &TemplateContext) -> String {
    TOKEN_REGEX
        .replace_all(template, |caps: &regex::Captures<'_>| {
            context.get(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}

/// Single-line form of a template for embedding in the metadata block
pub fn escape_newlines(text: &str) -> String {
    text.replace('\n', "\\n")
}

/// Metadata block appended to a successful response. The usage block is
/// only present when the response reported usage.
pub fn metadata_block(
    metadata: &CompletionMetadata,
    request: &GenerationRequest,
    prompt_text: &str,
) -> String {
    let context = TemplateContext::new()
        .with("id", &metadata.id)
        .with("finish_reason", metadata.finish_reason.as_deref().unwrap_or_default())
        .with("object_type", &metadata.object_type)
        .with("created", metadata.created)
        .with("prompt_template", escape_newlines(PROMPT_TEMPLATE))
        .with("prompt_text", prompt_text)
        .with("model", &metadata.model)
        .with("temperature", request.temperature())
        .with("top_p", request.top_p())
        .with("top_k", request.top_k());

    let mut block = render(METADATA_TEMPLATE, &context);
    if let Some(usage) = metadata.usage {
        let usage_context = TemplateContext::new()
            .with("prompt_tokens", usage.prompt_tokens)
            .with("completion_tokens", usage.completion_tokens)
            .with("total_tokens", usage.total_tokens);
        block.push_str(&render(USAGE_TEMPLATE, &usage_context));
    }
    block
}
