use serde::Deserialize;

use crate::config::PluginSettings;

/// One generation request, built fresh per user action
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt_text: String,
    stop: Vec<String>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    stream: bool,
}

impl GenerationRequest {
    /// Build a request for an already-rendered prompt. Sampling values are
    /// clamped into the ranges the endpoint accepts.
    pub fn new(prompt_text: impl Into<String>, settings: &PluginSettings) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            stop: settings.stops.clone(),
            max_tokens: settings.max_tokens.max(1),
            temperature: clamp_or(settings.temperature, 0.0, 2.0, 0.1),
            top_p: clamp_or(settings.top_p, 0.0, 1.0, 0.95),
            top_k: settings.top_k,
            repeat_penalty: if settings.repeat_penalty.is_nan() {
                1.0
            } else {
                settings.repeat_penalty.max(1.0)
            },
            stream: settings.stream,
        }
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn stop(&self) -> &[String] {
        &self.stop
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    pub fn top_k(&self) -> u32 {
        self.top_k
    }

    pub fn repeat_penalty(&self) -> f32 {
        self.repeat_penalty
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Request body for `POST {api_url}/completions`
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "prompt": self.prompt_text,
            "stop": self.stop,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "repeat_penalty": self.repeat_penalty,
            "top_p": self.top_p,
            "top_k": self.top_k,
            "stream": self.stream,
        })
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Token accounting, only reported by non-streaming responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One decoded unit of a streamed response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationChunk {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub finish_reason: Option<String>,
    pub object_type: String,
    pub text_fragment: String,
    pub usage: Option<Usage>,
}

impl From<CompletionPayload> for GenerationChunk {
    fn from(payload: CompletionPayload) -> Self {
        let choice = payload.choices.into_iter().next().unwrap_or_default();
        Self {
            id: payload.id,
            model: payload.model,
            created: payload.created,
            finish_reason: choice.finish_reason,
            object_type: payload.object,
            text_fragment: choice.text,
            usage: payload.usage,
        }
    }
}

/// Metadata describing where a successful completion came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionMetadata {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub object_type: String,
    pub finish_reason: Option<String>,
    /// `None` on the streaming path, chunks do not carry usage
    pub usage: Option<Usage>,
}

impl CompletionMetadata {
    /// Metadata taken from the last streamed chunk, usage deliberately dropped
    pub fn from_last_chunk(chunk: &GenerationChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            model: chunk.model.clone(),
            created: chunk.created,
            object_type: chunk.object_type.clone(),
            finish_reason: chunk.finish_reason.clone(),
            usage: None,
        }
    }
}

/// Terminal result of a request. Exactly one per request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success {
        text: String,
        metadata: CompletionMetadata,
    },
    Empty,
    Failure(String),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success { .. })
    }
}

impl From<CompletionError> for GenerationOutcome {
    fn from(err: CompletionError) -> Self {
        GenerationOutcome::Failure(err.to_string())
    }
}

/// Completion endpoint errors. Always converted to
/// [`GenerationOutcome::Failure`] before leaving the client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP {status}: {message}")]
    Transport { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },
}

/// Wire shape shared by the whole response and every streamed `data:` line
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CompletionPayload {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CompletionChoice {
    pub text: String,
    pub finish_reason: Option<String>,
}
