//! Remote assignment service
//!
//! [`AssignmentService`] abstracts the Graph batch endpoint, single
//! requests and assignment listing so the engine can run against
//! [`GraphService`] or a test double.

mod factory;
mod graph;
mod payload;
mod refresh;

pub use factory::create_assignment_service;
pub use graph::GraphService;
pub use payload::{assignment_request, parse_assignment};
pub use refresh::{fetch_assignment_index, ServiceRefresher};

use crate::config::MAX_RETRY_AFTER;
use crate::error::Result;
use crate::types::{ArtifactRef, ExistingAssignment};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Status used for responses synthesised locally (no HTTP status exists)
pub const SYNTHETIC_STATUS: u16 = 0;

/// One sub-request of a `$batch` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    /// Correlation id, unique within the envelope
    pub id: String,
    /// HTTP method
    pub method: String,
    /// Path relative to the Graph base URL
    pub url: String,
    /// JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Extra headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Response to one sub-request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResponse {
    /// Id of the sub-request this answers
    pub id: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, if any
    #[serde(default)]
    pub body: Option<Value>,
}

impl SubResponse {
    /// Create a response with no headers or body
    pub fn new(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Locally synthesised failure for a sub-request that got no answer
    pub fn synthetic(id: impl Into<String>, message: &str) -> Self {
        Self::new(id, SYNTHETIC_STATUS)
            .with_body(serde_json::json!({ "error": { "message": message } }))
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Retry-After` in seconds, if present and numeric
    ///
    /// Capped at [`MAX_RETRY_AFTER`].
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.header("Retry-After")?.trim();
        raw.parse::<u64>()
            .ok()
            .map(Duration::from_secs)
            .or_else(|| {
                let secs = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s >= 0.0)?;
                // Finite but beyond what a Duration holds
                Some(Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER))
            })
            .map(|wait| wait.min(MAX_RETRY_AFTER))
    }
}

/// Remote operations the engine depends on
#[async_trait]
pub trait AssignmentService: Send + Sync {
    /// Send up to 20 sub-requests in one `$batch` call
    ///
    /// Responses may come back in any order; callers correlate by id.
    async fn submit_batch(&self, requests: &[SubRequest]) -> Result<Vec<SubResponse>>;

    /// Send a single request outside of a batch
    async fn submit_one(&self, request: &SubRequest) -> Result<SubResponse>;

    /// List every assignment of an artifact, following pagination
    async fn list_assignments(&self, artifact: &ArtifactRef) -> Result<Vec<ExistingAssignment>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_is_case_insensitive() {
        let response = SubResponse::new("1", 429).with_header("retry-after", "7");
        assert_eq!(response.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_accepts_fractional_seconds() {
        let response = SubResponse::new("1", 429).with_header("Retry-After", "1.5");
        assert_eq!(response.retry_after(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_retry_after_ignores_garbage() {
        let response = SubResponse::new("1", 429).with_header("Retry-After", "soon");
        assert_eq!(response.retry_after(), None);
        assert_eq!(SubResponse::new("1", 429).retry_after(), None);
    }

    #[test]
    fn test_retry_after_caps_oversized_values() {
        for raw in ["18446744073709551615", "1e30", "7200"] {
            let response = SubResponse::new("1", 429).with_header("Retry-After", raw);
            assert_eq!(response.retry_after(), Some(MAX_RETRY_AFTER), "header {raw}");
        }
    }

    #[test]
    fn test_retry_after_rejects_negative_and_nan() {
        for raw in ["-5", "-1e30", "NaN", "inf"] {
            let response = SubResponse::new("1", 429).with_header("Retry-After", raw);
            assert_eq!(response.retry_after(), None, "header {raw}");
        }
    }

    #[test]
    fn test_batch_response_deserializes_without_optional_fields() {
        let raw = r#"{"id": "3", "status": 204}"#;
        let response: SubResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.id, "3");
        assert_eq!(response.status, 204);
        assert!(response.body.is_none());
    }
}
