//! Plugin settings: completion endpoint, sampling parameters and node colors
//!
//! Stored in the `[settings]` table of `~/.config/canvas-llm/config.toml`

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PluginError, Result};

/// Settings snapshot consumed by the generation flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Base URL of the llama-cpp-python compatible API
    pub api_url: String,
    /// Maximum tokens in model response
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Nucleus sampling (0.0 - 1.0)
    pub top_p: f32,
    /// Top-k sampling, 0 disables it
    pub top_k: u32,
    /// Repetition penalty (>= 1.0)
    pub repeat_penalty: f32,
    /// Stop sequences sent with every request
    pub stops: Vec<String>,
    /// Append a YAML metadata block to successful responses
    pub display_metadata: bool,
    /// Stream tokens into the node as they arrive
    #[serde(alias = "typewriter_mode")]
    pub stream: bool,
    pub colors: NodeColors,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/v1".to_string(),
            max_tokens: 256,
            temperature: 0.1,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            stops: vec!["###".to_string()],
            display_metadata: false,
            stream: true,
            colors: NodeColors::default(),
        }
    }
}

impl PluginSettings {
    /// Check every field against the ranges the completion endpoint accepts
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_url).map_err(|e| PluginError::InvalidSetting {
            field: "api_url",
            reason: e.to_string(),
        })?;

        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be within 0.0..=2.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid("top_p", "must be within 0.0..=1.0"));
        }
        if self.repeat_penalty.is_nan() || self.repeat_penalty < 1.0 {
            return Err(invalid("repeat_penalty", "must be at least 1.0"));
        }

        for (field, color) in [
            ("colors.success", &self.colors.success),
            ("colors.warning", &self.colors.warning),
            ("colors.error", &self.colors.error),
        ] {
            if !color.is_valid() {
                return Err(invalid(field, &format!("`{}` is not a #rrggbb color", color)));
            }
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> PluginError {
    PluginError::InvalidSetting {
        field,
        reason: reason.to_string(),
    }
}

/// Colors applied to the response node for each terminal outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeColors {
    pub success: ColorToken,
    pub warning: ColorToken,
    pub error: ColorToken,
}

impl Default for NodeColors {
    fn default() -> Self {
        Self {
            success: ColorToken::new("#44CF6E"),
            warning: ColorToken::new("#E0DE71"),
            error: ColorToken::new("#FB464C"),
        }
    }
}

/// A host color token, `#rrggbb`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorToken(String);

impl ColorToken {
    pub fn new(hex: &str) -> Self {
        Self(hex.to_string())
    }

    pub fn is_valid(&self) -> bool {
        self.rgb().is_some()
    }

    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.0.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }

        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

        Some((r, g, b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ColorToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
