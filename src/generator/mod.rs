//! Trace producers
//!
//! A [`TraceGenerator`] turns an [`AnalyzeRequest`] into raw model text. The
//! text is untrusted; the analyzer runs it through the normalizer before
//! anything else sees it.

pub mod openai;
pub mod prompt;

pub use openai::OpenAiGenerator;

use crate::analyzer::AnalyzeRequest;
use crate::config::{ConfigError, LlmConfig};
use async_trait::async_trait;
use log::info;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Stdout line of the mock trace
pub const MOCK_NOTICE: &str = "Mock mode: set OPENAI_API_KEY to enable real AI";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

#[async_trait]
pub trait TraceGenerator: Send + Sync {
    /// Produce raw trace text for `request`
    async fn generate(
        &self,
        request: &AnalyzeRequest,
        previous_summary: Option<&str>,
    ) -> Result<String, GenerateError>;

    fn name(&self) -> &'static str;
}

/// Offline generator returning a fixed one-step trace
#[derive(Debug, Clone, Copy, Default)]
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        MockGenerator
    }

    /// The raw document returned for `code`
    pub fn mock_document(code: &str) -> serde_json::Value {
        let first_line = code.split('\n').next().unwrap_or_default();
        json!({
            "version": "1.0",
            "steps": [
                {"code": first_line, "stdout": [MOCK_NOTICE]}
            ],
            "finalState": {
                "variables": {"x": 7},
                "stack": [],
                "heap": [],
                "stdout": ["7"],
                "errors": []
            }
        })
    }
}

#[async_trait]
impl TraceGenerator for MockGenerator {
    async fn generate(
        &self,
        request: &AnalyzeRequest,
        _previous_summary: Option<&str>,
    ) -> Result<String, GenerateError> {
        Ok(Self::mock_document(&request.code).to_string())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// OpenAI when an API key is configured, otherwise the mock
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn TraceGenerator>, GenerateError> {
    if config.has_api_key() {
        config.validate()?;
        let generator = OpenAiGenerator::new(config.clone())?;
        info!("Using OpenAI generator with model {}", generator.model());
        Ok(Arc::new(generator))
    } else {
        info!("No API key configured, using mock generator");
        Ok(Arc::new(MockGenerator::new()))
    }
}
