use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::jsonc::{self, LocalizationMap, DEFAULT_INDENT};
use crate::retry::{with_retry_if, RetryPolicy};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Translates the values of a localization mapping, keeping its keys.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, source: &LocalizationMap) -> Result<LocalizationMap>;
}

// ==================== Key Policy ====================

/// What to do when the translated key set drifts from the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Missing or extra keys fail the archive
    #[default]
    Strict,
    /// Missing keys keep the source text, extra keys are dropped
    BestEffort,
}

#[derive(Debug, Error)]
#[error("unknown key policy '{0}' (expected 'strict' or 'best-effort')")]
pub struct UnknownKeyPolicy(pub String);

impl FromStr for KeyPolicy {
    type Err = UnknownKeyPolicy;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "best-effort" | "best_effort" | "besteffort" => Ok(Self::BestEffort),
            _ => Err(UnknownKeyPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::Strict => f.write_str("strict"),
            KeyPolicy::BestEffort => f.write_str("best-effort"),
        }
    }
}

/// Keys present on only one side of a translation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDrift {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl KeyDrift {
    pub fn between(source: &LocalizationMap, translated: &LocalizationMap) -> Self {
        Self {
            missing: source
                .keys()
                .filter(|k| !translated.contains_key(*k))
                .cloned()
                .collect(),
            extra: translated
                .keys()
                .filter(|k| !source.contains_key(*k))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Check the translated keys against the source under `policy`.
///
/// On success the mapping is returned in source key order together with the
/// drift that was tolerated (always empty under `Strict`).
pub fn reconcile(
    source: &LocalizationMap,
    translated: LocalizationMap,
    policy: KeyPolicy,
) -> Result<(LocalizationMap, KeyDrift)> {
    let drift = KeyDrift::between(source, &translated);

    if !drift.is_empty() && policy == KeyPolicy::Strict {
        return Err(PipelineError::KeySetMismatch {
            missing: drift.missing,
            extra: drift.extra,
        });
    }

    let mut translated = translated;
    let merged = source
        .iter()
        .map(|(key, original)| {
            let value = translated
                .remove(key)
                .unwrap_or_else(|| original.clone());
            (key.clone(), value)
        })
        .collect();

    Ok((merged, drift))
}

// ==================== Prompt & Response Handling ====================

/// Build the instruction sent to the model, followed by the mapping as JSON
pub fn build_prompt(json_text: &str) -> String {
    format!(
        "당신은 게임전문 번역가입니다. 번역하고자 하는 게임은 마인크래프트의 모드입니다.\n\
         딕셔너리 형태의 데이터를 넘겨드릴겁니다. Key값은 그대로두고 Value값만 번역해야합니다.\n\
         영어를 한글로 번역하는 작업이며, 답변은 Json 형태로만 주시면 됩니다.\n\n\
         {}",
        json_text
    )
}

/// Remove a Markdown code fence around the model's answer.
///
/// Accepts a fence with or without a language tag, prose before the fence,
/// a missing closing fence, and surrounding whitespace. Text that already
/// starts with `{` is only stripped of a stray trailing fence.
pub fn strip_code_fence(raw: &str) -> &str {
    const FENCE: &str = "```";
    let text = raw.trim();

    if text.starts_with('{') {
        return text.strip_suffix(FENCE).map(str::trim_end).unwrap_or(text);
    }

    let Some(start) = text.find(FENCE) else {
        return text;
    };

    let body = text[start + FENCE.len()..]
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'));

    let body = match body.rfind(FENCE) {
        Some(end) => &body[..end],
        None => body,
    };

    body.trim()
}

/// Parse the model's raw answer into a mapping.
pub fn parse_response(raw: &str) -> Result<LocalizationMap> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(PipelineError::MalformedJson(
            "Response contained no JSON object".to_string(),
        ));
    }
    jsonc::parse(cleaned)
}

// ==================== Gemini Client ====================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn describe_empty(&self) -> String {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return format!("prompt blocked ({})", reason);
        }
        match self.candidates.first() {
            None => "response contained no candidates".to_string(),
            Some(c) => format!(
                "response contained no text (finish reason: {})",
                c.finish_reason.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

/// One failed request, tagged with whether another attempt may help
struct AttemptError {
    error: PipelineError,
    retryable: bool,
}

impl AttemptError {
    fn retryable(error: PipelineError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: PipelineError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// Google Gemini `generateContent` client
#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiTranslator {
    pub fn new(api_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                PipelineError::TranslationRequest(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::translation(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let translator = Self::new(
            &config.gemini_api_url,
            &config.gemini_model,
            &config.gemini_api_key,
            config.request_timeout,
        )?;
        let retry = RetryPolicy {
            max_attempts: config.max_attempts,
            ..RetryPolicy::translation()
        };
        Ok(translator.with_retry_policy(retry))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };
        let endpoint = self.endpoint();

        with_retry_if(
            &self.retry,
            &format!("Gemini request ({})", self.model),
            || self.send_once(&endpoint, &request),
            |e: &AttemptError| e.retryable,
        )
        .await
        .map_err(|e| e.error)
    }

    async fn send_once(
        &self,
        endpoint: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                AttemptError::retryable(PipelineError::TranslationRequest(format!(
                    "Failed to send request to Gemini API: {}",
                    e
                )))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(classify_failure(status, &body));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            AttemptError::retryable(PipelineError::TranslationRequest(format!(
                "Failed to parse Gemini response: {}",
                e
            )))
        })?;

        parsed.text().ok_or_else(|| {
            AttemptError::fatal(PipelineError::TranslationRequest(parsed.describe_empty()))
        })
    }
}

/// Map a non-success HTTP status to an error: rejected credentials are
/// never retried, rate limits and server errors are.
fn classify_failure(status: StatusCode, body: &str) -> AttemptError {
    let rejected_key = body.contains("API_KEY_INVALID") || body.contains("API key not valid");

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || (status == StatusCode::BAD_REQUEST && rejected_key)
    {
        return AttemptError::fatal(PipelineError::TranslationAuth(format!(
            "Gemini API returned {}: {}",
            status, body
        )));
    }

    let error = PipelineError::TranslationRequest(format!("Gemini API error ({}): {}", status, body));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AttemptError::retryable(error)
    } else {
        AttemptError::fatal(error)
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate(&self, source: &LocalizationMap) -> Result<LocalizationMap> {
        if source.is_empty() {
            return Ok(LocalizationMap::new());
        }

        info!("Starting translation of {} entries with {}", source.len(), self.model);

        let json_text = jsonc::serialize(source, DEFAULT_INDENT)?;
        let raw = self.generate(&build_prompt(&json_text)).await?;
        debug!("Raw translated response: {}", raw);

        let translated = parse_response(&raw)?;
        info!("Translation parsed into {} entries", translated.len());

        Ok(translated)
    }
}
