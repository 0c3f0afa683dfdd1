//! Optional LLM analysis over a finished record.
//!
//! A fixed prompt wraps the [`RecordSummary`] as JSON and asks for a JSON
//! object back. Responses are cached by prompt hash so re-running the same
//! company against the same model costs nothing. Nothing here feeds back
//! into scoring.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corpscope_shared::{
    AnalysisCache, AnalysisClient, AnalysisConfig, AnalysisError, AnalysisProvider,
    AnalysisResult, CorpscopeError, RecordSummary, Result, validate_api_key,
};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::retry::RetryPolicy;

/// Longest slice of an unparseable response kept in the fallback result.
const RAW_EXCERPT_CHARS: usize = 500;

/// Longest error body kept from a failed provider call.
const ERROR_BODY_CHARS: usize = 300;

const PROMPT_HEADER: &str = "You are an expert company data analyst. \
Analyze the following company data and provide insights.

Company data:
";

const PROMPT_FOOTER: &str = "

Provide a data quality assessment (1-100), missing information, business \
intelligence insights and recommendations for data enhancement.

Respond with a single JSON object and nothing else:
{
  \"data_quality_score\": <number>,
  \"missing_information\": [<string>],
  \"business_insights\": [<string>],
  \"recommendations\": [<string>],
  \"summary\": \"<overall summary>\"
}";

/// The fixed analysis prompt for `summary`.
pub fn build_prompt(summary: &RecordSummary) -> String {
    let data = serde_json::to_string_pretty(summary).unwrap_or_default();
    format!("{PROMPT_HEADER}{data}{PROMPT_FOOTER}")
}

/// Cache key: SHA-256 over prompt and model.
pub fn prompt_hash(prompt: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(model.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    data_quality_score: Option<f64>,
    #[serde(default)]
    missing_information: Vec<String>,
    #[serde(default)]
    business_insights: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    summary: String,
}

/// Parse a model reply, tolerating code fences and surrounding prose.
///
/// A reply with no readable JSON object degrades to a fallback result that
/// carries the raw text and the pipeline's own score.
pub fn parse_analysis(raw: &str, fallback_score: f64, model: &str) -> AnalysisResult {
    let clamp = |score: f64| score.clamp(0.0, 100.0).round() as u8;

    let parsed = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<RawAnalysis>(&raw[start..=end]).ok()
        }
        _ => None,
    };

    match parsed {
        Some(analysis) => AnalysisResult {
            data_quality_score: clamp(analysis.data_quality_score.unwrap_or(fallback_score)),
            missing_information: analysis.missing_information,
            business_insights: analysis.business_insights,
            recommendations: analysis.recommendations,
            summary: analysis.summary,
            model: model.to_string(),
        },
        None => {
            warn!(model, "analysis reply is not JSON, using fallback");
            AnalysisResult {
                data_quality_score: clamp(fallback_score),
                missing_information: vec!["Unable to parse AI response".into()],
                business_insights: vec![raw.trim().chars().take(RAW_EXCERPT_CHARS).collect()],
                recommendations: vec!["Review AI response manually".into()],
                summary: "AI analysis completed with parsing issues".into(),
                model: model.to_string(),
            }
        }
    }
}

async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> std::result::Result<T, AnalysisError> {
    let response = request
        .send()
        .await
        .map_err(|e| AnalysisError::Request(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AnalysisError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_CHARS).collect(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AnalysisError::Response(e.without_url().to_string()))
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("Corpscope/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| CorpscopeError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl AnalysisClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, company = %summary.company_name))]
    async fn analyze(
        &self,
        summary: &RecordSummary,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": build_prompt(summary) }],
            "temperature": 0.2,
        });

        let response: ChatResponse = send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::Response("reply has no message content".into()))?;

        debug!(chars = text.len(), "analysis reply received");
        Ok(parse_analysis(&text, summary.validation_score, &self.model))
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini `generateContent`. The key travels in a header so it never
/// appears in request URLs or their error text.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, company = %summary.company_name))]
    async fn analyze(
        &self,
        summary: &RecordSummary,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(summary) }] }],
        });

        let response: GenerateResponse = send_json(
            self.client
                .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(AnalysisError::Response("reply has no candidate text".into()));
        }

        debug!(chars = text.len(), "analysis reply received");
        Ok(parse_analysis(&text, summary.validation_score, &self.model))
    }
}

/// Build the configured client. `Ok(None)` when analysis is disabled; an
/// error when a provider is selected but its API key is missing.
pub fn client_from_config(config: &AnalysisConfig) -> Result<Option<Arc<dyn AnalysisClient>>> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let client: Arc<dyn AnalysisClient> = match config.provider {
        AnalysisProvider::None => return Ok(None),
        AnalysisProvider::OpenAi => Arc::new(OpenAiClient::new(
            &config.openai_base_url,
            validate_api_key(config)?,
            &config.openai_model,
            timeout,
        )?),
        AnalysisProvider::Gemini => Arc::new(GeminiClient::new(
            &config.gemini_base_url,
            validate_api_key(config)?,
            &config.gemini_model,
            timeout,
        )?),
    };
    info!(provider = %config.provider, model = client.model(), "analysis enabled");
    Ok(Some(client))
}

// ---------------------------------------------------------------------------
// Analyzer (client + cache + retry)
// ---------------------------------------------------------------------------

/// Runs analysis through the cache with bounded retries.
pub struct Analyzer {
    client: Arc<dyn AnalysisClient>,
    cache: Option<Arc<dyn AnalysisCache>>,
    retry: RetryPolicy,
}

impl Analyzer {
    pub fn new(
        client: Arc<dyn AnalysisClient>,
        cache: Option<Arc<dyn AnalysisCache>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            cache,
            retry,
        }
    }

    /// Analyze `summary`, serving repeated prompts from the cache.
    /// Cache failures are logged and otherwise ignored.
    #[instrument(skip_all, fields(company = %summary.company_name, model = self.client.model()))]
    pub async fn analyze(
        &self,
        summary: &RecordSummary,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let model = self.client.model();
        let key = prompt_hash(&build_prompt(summary), model);

        if let Some(cache) = &self.cache {
            match cache.get_analysis(&key).await {
                Ok(Some(hit)) => {
                    debug!("analysis cache hit");
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "analysis cache read failed"),
            }
        }

        let client = self.client.as_ref();
        let result = self
            .retry
            .run("analysis", move || client.analyze(summary), AnalysisError::is_transient)
            .await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_analysis(&key, model, &result).await {
                warn!(error = %e, "analysis cache write failed");
            }
        }
        Ok(result)
    }
}
