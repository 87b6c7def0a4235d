/// LLM Client: the single point of entry for all model API calls.
///
/// No other module talks to OpenAI or Gemini directly. Calls are made once;
/// failures are classified so callers can map them to user-facing messages.
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AiProvider;

pub mod prompts;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const OPENAI_FAST_MODEL: &str = "gpt-3.5-turbo";
pub const OPENAI_ACCURATE_MODEL: &str = "gpt-4";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";
const TEMPERATURE: f32 = 0.3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("provider quota exceeded")]
    QuotaExceeded,

    #[error("provider rejected the API key")]
    InvalidApiKey,

    #[error("content blocked by safety filters")]
    ContentBlocked,

    #[error("unable to reach provider: {0}")]
    Network(reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            LlmError::Network(e)
        } else {
            LlmError::Http(e)
        }
    }
}

/// Maps a failed provider response onto an error kind, using the status code
/// first and the error text second.
pub fn classify_failure(status: u16, message: &str) -> LlmError {
    let upper = message.to_uppercase();
    if upper.contains("QUOTA_EXCEEDED") || upper.contains("INSUFFICIENT_QUOTA") {
        LlmError::QuotaExceeded
    } else if status == 429 || upper.contains("RATE_LIMIT_EXCEEDED") {
        LlmError::RateLimited
    } else if status == 403 {
        LlmError::QuotaExceeded
    } else if status == 401 || upper.contains("API_KEY") {
        LlmError::InvalidApiKey
    } else if upper.contains("SAFETY") || upper.contains("BLOCKED") {
        LlmError::ContentBlocked
    } else {
        LlmError::Api {
            status,
            message: message.to_string(),
        }
    }
}

/// How much model to spend on a call. Matching uses the stronger model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Accurate,
}

// ── OpenAI wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

// ── Gemini wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiResponse {
    fn into_text(self) -> Result<String, LlmError> {
        if self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
            .is_some()
        {
            return Err(LlmError::ContentBlocked);
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyContent)?;
        if matches!(candidate.finish_reason.as_deref(), Some("SAFETY" | "BLOCKLIST")) {
            return Err(LlmError::ContentBlocked);
        }
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ProviderErrorBody {
    /// Message plus any machine-readable status so substring checks see both.
    fn describe(&self) -> String {
        let mut out = self.message.clone();
        if let Some(status) = &self.status {
            out.push_str(&format!(" [{status}]"));
        }
        if let Some(serde_json::Value::String(code)) = &self.code {
            out.push_str(&format!(" [{code}]"));
        }
        out
    }
}

/// The single LLM client used by every analyzer call.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    provider: AiProvider,
    api_key: String,
}

impl LlmClient {
    pub fn new(provider: AiProvider, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            provider,
            api_key,
        })
    }

    pub fn provider(&self) -> AiProvider {
        self.provider
    }

    /// Model name used for the given tier on the configured provider.
    pub fn model(&self, tier: ModelTier) -> &'static str {
        match (self.provider, tier) {
            (AiProvider::Gemini, _) => GEMINI_MODEL,
            (AiProvider::OpenAi, ModelTier::Fast) => OPENAI_FAST_MODEL,
            (AiProvider::OpenAi, ModelTier::Accurate) => OPENAI_ACCURATE_MODEL,
        }
    }

    /// Sends one prompt and returns the raw text of the reply.
    pub async fn complete(&self, prompt: &str, tier: ModelTier) -> Result<String, LlmError> {
        match self.provider {
            AiProvider::OpenAi => self.call_openai(prompt, tier).await,
            AiProvider::Gemini => self.call_gemini(prompt).await,
        }
    }

    /// Calls the model and deserializes the reply as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        tier: ModelTier,
    ) -> Result<T, LlmError> {
        let text = self.complete(prompt, tier).await?;
        let text = strip_json_fences(&text);
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    async fn call_openai(&self, prompt: &str, tier: ModelTier) -> Result<String, LlmError> {
        let model = self.model(tier);
        let request_body = OpenAiRequest {
            model,
            messages: vec![OpenAiMessage {
                role: "user",
                content: prompt,
            }],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: TEMPERATURE,
        };

        debug!("Calling OpenAI ({model})");
        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failure_from_body(status.as_u16(), body));
        }

        let parsed: OpenAiResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!("OpenAI call succeeded ({} chars)", content.len());
        Ok(content)
    }

    async fn call_gemini(&self, prompt: &str) -> Result<String, LlmError> {
        let enhanced = format!("{prompt}{}", prompts::GEMINI_JSON_SUFFIX);
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: &enhanced }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        debug!("Calling Gemini ({GEMINI_MODEL})");
        let url = format!("{GEMINI_API_BASE}/{GEMINI_MODEL}:generateContent");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failure_from_body(status.as_u16(), body));
        }

        let parsed: GeminiResponse = response.json().await?;
        let text = parsed.into_text()?;
        let cleaned = clean_fenced_text(&text);

        debug!("Gemini call succeeded ({} chars)", cleaned.len());
        Ok(cleaned)
    }
}

fn failure_from_body(status: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<ProviderError>(&body)
        .map(|e| e.error.describe())
        .unwrap_or(body);
    let err = classify_failure(status, &message);
    warn!("LLM API returned {status}: {err}");
    err
}

/// Removes every markdown fence marker, wherever the model put it.
fn clean_fenced_text(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
