use std::time::Duration;
use thiserror::Error;

/// Model used when `OPENAI_MODEL` is not set
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Base URL of the chat completions API
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("temperature must be within 0.0..=2.0, got {0}")]
    InvalidTemperature(f32),

    #[error("max_tokens must be positive")]
    ZeroMaxTokens,

    #[error("step interval must be positive")]
    ZeroInterval,
}

/// Configuration for the trace producer
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LlmConfig {
    /// API key; without one the mock generator is used
    pub api_key: Option<String>,

    /// Default: `gpt-4o-mini`
    pub model: String,

    /// Default: `https://api.openai.com/v1`
    pub endpoint: String,

    /// Default: 0.2
    pub temperature: f32,

    /// Default: 800
    pub max_tokens: u32,

    /// Timeout for a single request
    ///
    /// Default: 60 seconds
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: 0.2,
            max_tokens: 800,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    /// Defaults overridden by `OPENAI_API_KEY`, `OPENAI_MODEL` and
    /// `OPENAI_BASE_URL`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`LlmConfig::from_env`], reading variables through `lookup`.
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        config.api_key = var("OPENAI_API_KEY");
        if let Some(model) = var("OPENAI_MODEL") {
            config.model = model;
        }
        if let Some(endpoint) = var("OPENAI_BASE_URL") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        config
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        Ok(())
    }
}

/// Configuration for play mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Time between automatic steps
    ///
    /// Default: 1 second
    pub step_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_secs(1),
        }
    }
}

impl PlaybackConfig {
    #[must_use]
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}
