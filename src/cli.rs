use std::path::PathBuf;

use clap::Parser;

use canvas_llm::config::AppConfig;

/// canvas-llm: prompt a local LLM from a canvas node
#[derive(Parser, Debug, Clone)]
#[command(name = "canvas-llm")]
#[command(author = "RidgetopAI")]
#[command(version)]
#[command(about = "Run the LLM Instruction canvas action against a local completion endpoint", long_about = None)]
pub struct Cli {
    /// Text of the source node
    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    /// Config file to use instead of the platform default
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the completion API, `/completions` is appended
    #[arg(long, env = "CANVAS_LLM_API_URL")]
    pub api_url: Option<String>,

    /// Stream tokens into the node as they arrive
    #[arg(long, overrides_with = "no_stream")]
    pub stream: bool,

    /// Wait for the whole response
    #[arg(long, overrides_with = "stream")]
    pub no_stream: bool,

    /// Append the metadata block to successful responses
    #[arg(long, default_value_t = false)]
    pub display_metadata: bool,

    /// Maximum tokens in the response
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Flags given on the command line win over the config file
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        let settings = &mut config.settings;
        if let Some(api_url) = &self.api_url {
            settings.api_url = api_url.clone();
        }
        if self.stream {
            settings.stream = true;
        }
        if self.no_stream {
            settings.stream = false;
        }
        if self.display_metadata {
            settings.display_metadata = true;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }

        if let Some(log_level) = &self.log_level {
            config.general.log_level = log_level.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.general.log_file = Some(log_file.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["canvas-llm", "What is Rust?"]);
        assert_eq!(cli.prompt, "What is Rust?");
        assert!(cli.config.is_none());
        assert!(!cli.stream);
        assert!(!cli.no_stream);
        assert!(!cli.display_metadata);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_prompt_is_required() {
        assert!(Cli::try_parse_from(["canvas-llm"]).is_err());
    }

    #[test]
    fn test_last_stream_flag_wins() {
        let cli = Cli::parse_from(["canvas-llm", "--stream", "--no-stream", "q"]);
        assert!(!cli.stream);
        assert!(cli.no_stream);

        let cli = Cli::parse_from(["canvas-llm", "--no-stream", "--stream", "q"]);
        assert!(cli.stream);
        assert!(!cli.no_stream);
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::parse_from([
            "canvas-llm",
            "--api-url", "http://10.0.0.2:8080/v1",
            "--no-stream",
            "--display-metadata",
            "--max-tokens", "64",
            "--log-level", "debug",
            "q",
        ]);
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.settings.api_url, "http://10.0.0.2:8080/v1");
        assert!(!config.settings.stream);
        assert!(config.settings.display_metadata);
        assert_eq!(config.settings.max_tokens, 64);
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_no_flags_keep_config() {
        let cli = Cli::parse_from(["canvas-llm", "q"]);
        let mut config = AppConfig::default();
        config.settings.stream = false;
        cli.apply_overrides(&mut config);

        assert_eq!(config, {
            let mut expected = AppConfig::default();
            expected.settings.stream = false;
            expected
        });
    }
}
