// src/generative/openai.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationError, Prompt, ResponseFormat, TextGenerator};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI (or compatible) Chat Completions client.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiGenerator {
    /// `model_override`: pass Some("gpt-4o") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: &str, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::providers::USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: api_key.to_string(),
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
            url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonFormat>,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey("openai"));
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &prompt.system,
                },
                Msg {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
            response_format: match prompt.format {
                ResponseFormat::JsonObject => Some(JsonFormat {
                    kind: "json_object",
                }),
                ResponseFormat::Text => None,
            },
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body: Resp = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
