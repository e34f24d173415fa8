use super::prompt::{user_prompt, SYSTEM_PROMPT};
use super::{GenerateError, TraceGenerator};
use crate::analyzer::AnalyzeRequest;
use crate::config::LlmConfig;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Content used when the model returns no message
const EMPTY_CONTENT: &str = "{}";

/// OpenAI-compatible chat completions client.
pub struct OpenAiGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| EMPTY_CONTENT.to_string())
    }
}

impl OpenAiGenerator {
    pub fn new(config: LlmConfig) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(OpenAiGenerator { config, client })
    }

    /// Create with settings from the environment.
    pub fn from_env() -> Result<Self, GenerateError> {
        Self::new(LlmConfig::from_env())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl TraceGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        request: &AnalyzeRequest,
        previous_summary: Option<&str>,
    ) -> Result<String, GenerateError> {
        let prompt = user_prompt(request, previous_summary);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            "POST {}/chat/completions (model {}, {} prompt bytes)",
            self.config.endpoint,
            self.model(),
            prompt.len()
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.endpoint))
            .json(&body);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api { status, body });
        }

        let result: ChatResponse = response.json().await?;
        Ok(result.into_content())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
