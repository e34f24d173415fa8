//! Command-line argument parsing.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracescope::analyzer::Language;
use tracescope::config::{LlmConfig, PlaybackConfig};

/// Step through a model-generated execution trace of a source file
#[derive(Parser, Debug)]
#[command(name = "tracescope")]
#[command(version)]
pub struct Args {
    /// Source file to analyze
    pub file: PathBuf,

    /// Source language (inferred from the file extension when omitted)
    #[arg(long, short)]
    pub language: Option<Language>,

    /// Session id; requests in one session share context
    #[arg(long, default_value = "local")]
    pub session: String,

    /// Model name (overrides OPENAI_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Milliseconds between steps in play mode
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,

    /// Print the normalized trace as JSON and exit
    #[arg(long)]
    pub json: bool,

    /// Write logs to this file (the TUI owns the terminal)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Language from the flag, else from the file extension
    pub fn language(&self) -> Result<Language> {
        if let Some(language) = self.language {
            return Ok(language);
        }
        match Language::from_path(&self.file) {
            Some(language) => Ok(language),
            None => bail!(
                "cannot infer the language of '{}'; pass --language",
                self.file.display()
            ),
        }
    }

    /// Environment settings with CLI overrides applied
    pub fn llm_config(&self) -> LlmConfig {
        let config = LlmConfig::from_env();
        match &self.model {
            Some(model) => config.with_model(model.clone()),
            None => config,
        }
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig::default().with_step_interval(Duration::from_millis(self.interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        let args = Args::parse_from(["tracescope", "demo.py"]);
        assert_eq!(args.language().unwrap(), Language::Python);
        assert_eq!(args.session, "local");
        assert_eq!(args.playback_config().step_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_language_flag_wins() {
        let args = Args::parse_from(["tracescope", "demo.txt", "--language", "java"]);
        assert_eq!(args.language().unwrap(), Language::Java);
    }

    #[test]
    fn test_unknown_extension_needs_flag() {
        let args = Args::parse_from(["tracescope", "Makefile"]);
        assert!(args.language().is_err());
    }

    #[test]
    fn test_invalid_language_rejected() {
        assert!(Args::try_parse_from(["tracescope", "a.c", "--language", "cobol"]).is_err());
    }
}
