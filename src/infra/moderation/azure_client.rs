// =============================================================================
// AZURE AI CONTENT SAFETY CLIENT
// =============================================================================
//
// Implements the `Moderator` trait on top of Azure AI Content Safety
// (https://learn.microsoft.com/azure/ai-services/content-safety/).
//
// **Request:** `POST {endpoint}/contentsafety/text:analyze?api-version=2023-10-01`
// with the key in the `Ocp-Apim-Subscription-Key` header.
//
// **Response:** `categoriesAnalysis[]` with a severity per category. With
// `FourSeverityLevels` output the severity is one of 0, 2, 4 or 6; we divide
// by 6 to get the normalized score the threshold policy works with.

use crate::core::moderation::{ConfigError, ModerationError, Moderator, Verdict};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_VERSION: &str = "2023-10-01";
const CATEGORIES: [&str; 4] = ["Hate", "SelfHarm", "Sexual", "Violence"];
const OUTPUT_TYPE: &str = "FourSeverityLevels";
const MAX_SEVERITY: f64 = 6.0;
/// The service rejects longer inputs.
const MAX_TEXT_CHARS: usize = 10_000;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeTextRequest<'a> {
    text: &'a str,
    categories: &'a [&'a str],
    output_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeTextResponse {
    #[serde(default)]
    categories_analysis: Vec<CategoryAnalysis>,
}

#[derive(Debug, Deserialize)]
struct CategoryAnalysis {
    category: String,
    #[serde(default)]
    severity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AnalyzeTextResponse {
    fn into_verdict(self) -> Verdict {
        Verdict::from_scores(self.categories_analysis.into_iter().map(|analysis| {
            let severity = f64::from(analysis.severity.unwrap_or(0));
            (analysis.category, (severity / MAX_SEVERITY).clamp(0.0, 1.0))
        }))
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct AzureContentSafetyClient {
    client: Client,
    url: String,
    api_key: String,
}

impl AzureContentSafetyClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, ConfigError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ConfigError::Backend("Azure endpoint is required".to_string()));
        }
        if api_key.trim().is_empty() {
            return Err(ConfigError::Backend("Azure API key is required".to_string()));
        }

        let parsed = Url::parse(endpoint)
            .map_err(|e| ConfigError::Backend(format!("invalid Azure endpoint: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Backend(format!(
                "Azure endpoint must be http(s), got {}",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent("ContentModerationBot/1.0")
            .build()
            .map_err(|e| ConfigError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/contentsafety/text:analyze", endpoint),
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl Moderator for AzureContentSafetyClient {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        if text.trim().is_empty() {
            return Ok(Verdict::safe());
        }

        let payload = AnalyzeTextRequest {
            text: truncate_chars(text, MAX_TEXT_CHARS),
            categories: &CATEGORIES,
            output_type: OUTPUT_TYPE,
        };

        let response = self
            .client
            .post(&self.url)
            .query(&[("api-version", API_VERSION)])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModerationError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let parsed: AnalyzeTextResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::Transient(format!("unreadable response: {}", e)))?;

        Ok(parsed.into_verdict())
    }

    fn name(&self) -> &str {
        "azure"
    }
}

/// Map a non-success status (and its body) to a moderation error.
fn error_for_status(status: StatusCode, body: &str) -> ModerationError {
    let detail = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!(
            "{} - {}: {}",
            status,
            envelope.error.code.unwrap_or_else(|| "Unknown".to_string()),
            envelope.error.message.unwrap_or_default()
        ),
        Err(_) => format!("{} - {}", status, body),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ModerationError::InvalidCredential(detail)
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ModerationError::Transient(detail)
        }
        s if s.is_server_error() => ModerationError::Transient(detail),
        StatusCode::NOT_FOUND => ModerationError::Configuration(detail),
        _ => ModerationError::Rejected(detail),
    }
}

/// Cut `text` to at most `max` chars without splitting a code point.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
