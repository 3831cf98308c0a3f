//! LLM client: the single way out to Gemini and OpenAI.
//!
//! Every edge function and service goes through `LlmClient`; nothing else
//! talks to a provider directly. The provider is picked from the model name
//! (`gpt-*` goes to OpenAI, everything else to Gemini). Transient failures
//! (transport errors, 429, 5xx) are retried with a linear backoff.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::json_repair::{repair_json, RepairError};

pub mod prompts;
pub mod retry;

use retry::{with_retry, Classify, ErrorKind, RetryPolicy};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_API_BASE: &str = "https://api.openai.com";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model output is not valid JSON: {0}")]
    Repair(#[from] RepairError),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No API key configured for {0}")]
    MissingKey(&'static str),
}

impl Classify for LlmError {
    fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                ErrorKind::Network
            }
            LlmError::Http(e) => ErrorKind::classify(&e.to_string()),
            LlmError::Api { status, .. } => match *status {
                401 | 403 => ErrorKind::Authentication,
                429 | 500..=599 => ErrorKind::Api,
                400..=499 => ErrorKind::Validation,
                _ => ErrorKind::Unknown,
            },
            LlmError::Parse(_) | LlmError::Repair(_) | LlmError::EmptyContent => {
                ErrorKind::Validation
            }
            LlmError::MissingKey(_) => ErrorKind::Authentication,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gpt-") {
            Provider::OpenAi
        } else {
            Provider::Gemini
        }
    }
}

/// Base64 image sent alongside the prompt (scanned CV pages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub images: Vec<InlineImage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Ask the provider for a JSON-only response.
    pub json: bool,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmOutput {
    pub text: String,
    pub model: String,
    pub provider: Provider,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub gemini_api_key: String,
    pub openai_api_key: Option<String>,
    pub default_model: String,
    pub gemini_base_url: String,
    pub openai_base_url: String,
    pub retry: RetryPolicy,
}

impl LlmSettings {
    pub fn new(gemini_api_key: String) -> Self {
        Self {
            gemini_api_key,
            openai_api_key: None,
            default_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: GEMINI_API_BASE.to_string(),
            openai_base_url: OPENAI_API_BASE.to_string(),
            retry: RetryPolicy::linear(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provider wire formats
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn gemini_body(req: &LlmRequest) -> Value {
    let mut parts = vec![json!({ "text": req.prompt })];
    parts.extend(req.images.iter().map(|img| {
        json!({ "inline_data": { "mime_type": img.mime_type, "data": img.data } })
    }));

    let mut generation_config = json!({
        "maxOutputTokens": req.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
    });
    if let Some(t) = req.temperature {
        generation_config["temperature"] = json!(t);
    }
    if req.json {
        generation_config["responseMimeType"] = json!("application/json");
    }

    let mut body = json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    });
    if let Some(system) = &req.system {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

fn openai_body(req: &LlmRequest, model: &str) -> Value {
    let user_content = if req.images.is_empty() {
        json!(req.prompt)
    } else {
        let mut parts = vec![json!({ "type": "text", "text": req.prompt })];
        parts.extend(req.images.iter().map(|img| {
            json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", img.mime_type, img.data) }
            })
        }));
        Value::Array(parts)
    };

    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": user_content }));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": req.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
    });
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    if req.json {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

/// Pulls a readable message out of a provider error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {e}");
                Client::new()
            });
        Self { client, settings }
    }

    pub fn default_model(&self) -> &str {
        &self.settings.default_model
    }

    /// Sends one request, retrying transient failures.
    pub async fn generate(&self, req: &LlmRequest) -> Result<LlmOutput, LlmError> {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.settings.default_model.clone());
        let provider = Provider::for_model(&model);
        let model_name = model.as_str();

        let output = with_retry(&self.settings.retry, move || async move {
            match provider {
                Provider::Gemini => self.call_gemini(req, model_name).await,
                Provider::OpenAi => self.call_openai(req, model_name).await,
            }
        })
        .await?;

        debug!(
            "LLM call succeeded: model={}, input_tokens={}, output_tokens={}",
            output.model, output.input_tokens, output.output_tokens
        );
        Ok(output)
    }

    /// Generates and runs the output through JSON repair.
    pub async fn generate_json(&self, req: &LlmRequest) -> Result<(Value, LlmOutput), LlmError> {
        let mut req = req.clone();
        req.json = true;
        let output = self.generate(&req).await?;
        let value = repair_json(&output.text)?;
        Ok((value, output))
    }

    async fn call_gemini(&self, req: &LlmRequest, model: &str) -> Result<LlmOutput, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.gemini_base_url, model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.settings.gemini_api_key)
            .json(&gemini_body(req))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini returned {status}: {body}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response.text().await?)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }

        let usage = parsed.usage_metadata.unwrap_or_default();
        Ok(LlmOutput {
            text,
            model: model.to_string(),
            provider: Provider::Gemini,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }

    async fn call_openai(&self, req: &LlmRequest, model: &str) -> Result<LlmOutput, LlmError> {
        let key = self
            .settings
            .openai_api_key
            .as_deref()
            .ok_or(LlmError::MissingKey("openai"))?;
        let url = format!("{}/v1/chat/completions", self.settings.openai_base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&openai_body(req, model))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI returned {status}: {body}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: OpenAiResponse = serde_json::from_str(&response.text().await?)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));
        Ok(LlmOutput {
            text,
            model: model.to_string(),
            provider: Provider::OpenAi,
            input_tokens,
            output_tokens,
        })
    }
}
