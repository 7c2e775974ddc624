//! HubSpot CRM sync.
//!
//! Modules:
//! - mapper: record → company/deal properties, required-field check,
//!   existing-vs-new company resolution
//! - client: reqwest client implementing `HubSpotSync`

pub mod client;
pub mod mapper;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DiligenceError;

// ============================================================================
// Wire types
// ============================================================================

/// A CRM object as returned by the v3 objects API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubSpotObject {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Option<String>>,
}

impl HubSpotObject {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubSpotSearchResponse {
    #[serde(default)]
    pub results: Vec<HubSpotObject>,
}

/// Company fields passed to the scorer as CRM context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotCompanyData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_revenue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_employees: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_stage: Option<String>,
}

/// Company properties requested on every read.
pub const COMPANY_PROPERTIES: &[&str] = &[
    "name",
    "domain",
    "industry",
    "description",
    "annualrevenue",
    "numberofemployees",
    "lifecyclestage",
];

impl From<&HubSpotObject> for HubSpotCompanyData {
    fn from(obj: &HubSpotObject) -> Self {
        let prop = |name: &str| obj.property(name).map(str::to_string);
        Self {
            id: obj.id.clone(),
            name: prop("name"),
            domain: prop("domain"),
            industry: prop("industry"),
            description: prop("description"),
            annual_revenue: prop("annualrevenue"),
            number_of_employees: prop("numberofemployees"),
            lifecycle_stage: prop("lifecyclestage"),
        }
    }
}

/// Outcome of pushing a record to HubSpot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotSyncResult {
    pub deal_id: String,
    pub company_id: String,
    pub hubspot_data: serde_json::Value,
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HubSpotError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HubSpot access token not set (env {0})")]
    MissingToken(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Request exhausted retries")]
    RetriesExhausted,
}

impl From<HubSpotError> for DiligenceError {
    fn from(err: HubSpotError) -> Self {
        DiligenceError::HubSpot(err.to_string())
    }
}

// ============================================================================
// Retry
// ============================================================================

/// HubSpot's `Retry-After` is honoured up to this many seconds.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(30);
const JITTER_MS: u64 = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry that follows `attempt` (1-based). A server hint
    /// replaces the exponential schedule.
    fn wait_after(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(RETRY_AFTER_CAP);
        }
        let doubling = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let base = self
            .initial_backoff_ms
            .saturating_mul(doubling)
            .min(self.max_backoff_ms);
        Duration::from_millis(base + jitter_ms())
    }
}

fn jitter_ms() -> u64 {
    (uuid::Uuid::new_v4().as_u128() % u128::from(JITTER_MS)) as u64
}

/// Rate limits, request timeouts and 5xx are worth another attempt.
fn is_retryable(status: reqwest::StatusCode) -> bool {
    matches!(
        status,
        reqwest::StatusCode::TOO_MANY_REQUESTS | reqwest::StatusCode::REQUEST_TIMEOUT
    ) || status.is_server_error()
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Send a request, retrying rate limits, timeouts, 5xx, and connect errors
/// with exponential backoff. `Retry-After` wins when HubSpot sends it.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, HubSpotError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        // Streaming bodies cannot be replayed; send once.
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(HubSpotError::Http);
        };
        let last = attempt == attempts;

        let (reason, hint) = match cloned.send().await {
            Ok(response) if last || !is_retryable(response.status()) => return Ok(response),
            Ok(response) => (format!("status {}", response.status()), retry_after(&response)),
            Err(err) if last || !(err.is_timeout() || err.is_connect()) => {
                return Err(HubSpotError::Http(err))
            }
            Err(err) => (format!("transport error: {}", err), None),
        };

        let wait = policy.wait_after(attempt, hint);
        log::warn!(
            "hubspot: attempt {}/{} failed with {}, retrying in {:?}",
            attempt,
            attempts,
            reason,
            wait
        );
        tokio::time::sleep(wait).await;
    }

    Err(HubSpotError::RetriesExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        use reqwest::StatusCode;
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        let ms = |attempt| policy.wait_after(attempt, None).as_millis() as u64;
        assert!((100..100 + JITTER_MS).contains(&ms(1)));
        assert!((400..400 + JITTER_MS).contains(&ms(3)));
        assert!((1_000..1_000 + JITTER_MS).contains(&ms(6)));
        assert!((1_000..1_000 + JITTER_MS).contains(&ms(80)));
    }

    #[test]
    fn test_server_hint_is_honoured_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.wait_after(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.wait_after(1, Some(Duration::from_secs(600))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_retry_policy_deserializes_partial() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"maxAttempts": 2}"#).expect("parse");
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.initial_backoff_ms, 500);
    }

    #[test]
    fn test_company_data_from_object() {
        let obj: HubSpotObject = serde_json::from_str(
            r#"{"id": "42", "properties": {"name": "Acme", "domain": "acme.io", "industry": null, "description": "  "}}"#,
        )
        .expect("parse");
        let data = HubSpotCompanyData::from(&obj);
        assert_eq!(data.id, "42");
        assert_eq!(data.name.as_deref(), Some("Acme"));
        assert_eq!(data.industry, None);
        assert_eq!(data.description, None);
    }

    #[test]
    fn test_error_converts_to_best_effort() {
        let err: DiligenceError = HubSpotError::MissingToken("HUBSPOT_ACCESS_TOKEN".into()).into();
        assert_eq!(err.kind(), crate::error::ErrorKind::BestEffort);
    }
}
