//! Hosted text-generation clients used for report writing.
//!
//! Every failure surfaces as [`UpstreamError`]; retry and timeout policy is
//! left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::{LlmProvider, LlmSettings};
use crate::error::UpstreamError;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier recorded alongside generated reports.
    fn model(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResponse, UpstreamError>;
}

/// OpenAI- or Anthropic-compatible HTTP client, or a disabled stub.
pub struct HttpGenerator {
    http: reqwest::Client,
    provider: LlmProvider,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(settings: &LlmSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let (default_model, default_base, key_var) = match settings.provider {
            LlmProvider::OpenAi => (OPENAI_DEFAULT_MODEL, OPENAI_BASE_URL, "OPENAI_API_KEY"),
            LlmProvider::Anthropic => {
                (ANTHROPIC_DEFAULT_MODEL, ANTHROPIC_BASE_URL, "ANTHROPIC_API_KEY")
            }
            LlmProvider::None => ("", "", ""),
        };
        let model = if settings.model.is_empty() {
            default_model.to_string()
        } else {
            settings.model.clone()
        };
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                if key_var.is_empty() {
                    return None;
                }
                std::env::var(key_var).ok().filter(|k| !k.is_empty())
            });
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| default_base.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(HttpGenerator {
            http,
            provider: settings.provider,
            model,
            api_key,
            base_url,
        })
    }

    fn key(&self) -> Result<&str, UpstreamError> {
        self.api_key.as_deref().ok_or_else(|| {
            UpstreamError::Unavailable(format!("no API key configured for {:?}", self.provider))
        })
    }

    async fn post(
        &self,
        request: reqwest::RequestBuilder,
        body: serde_json::Value,
    ) -> Result<String, UpstreamError> {
        let resp = request
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        debug!("Text generation responded {} ({} bytes)", status, text.len());

        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Err(UpstreamError::Unavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                snippet
            )));
        }
        Ok(text)
    }

    async fn openai(&self, req: &GenerationRequest) -> Result<String, UpstreamError> {
        let key = self.key()?;
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": req.system_prompt},
                {"role": "user", "content": req.user_prompt},
            ],
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(key);
        parse_openai(&self.post(request, body).await?)
    }

    async fn anthropic(&self, req: &GenerationRequest) -> Result<String, UpstreamError> {
        let key = self.key()?;
        let body = json!({
            "model": self.model,
            "system": req.system_prompt,
            "messages": [{"role": "user", "content": req.user_prompt}],
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        let request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        parse_anthropic(&self.post(request, body).await?)
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, UpstreamError> {
        let text = match self.provider {
            LlmProvider::OpenAi => self.openai(request).await?,
            LlmProvider::Anthropic => self.anthropic(request).await?,
            LlmProvider::None => {
                return Err(UpstreamError::Unavailable(
                    "text generation is disabled".to_string(),
                ))
            }
        };
        Ok(GenerationResponse {
            text,
            model: self.model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn non_empty(text: Option<String>, what: &str) -> Result<String, UpstreamError> {
    text.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| UpstreamError::Malformed(format!("no text in {}", what)))
}

pub fn parse_openai(body: &str) -> Result<String, UpstreamError> {
    let parsed: ChatCompletion =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
    let content = parsed.choices.into_iter().next().and_then(|c| c.message.content);
    non_empty(content, "chat completion")
}

pub fn parse_anthropic(body: &str) -> Result<String, UpstreamError> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
    let text = parsed
        .content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text);
    non_empty(text, "message")
}

// ── Tests ──
