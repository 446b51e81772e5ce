//! Sub-response classification
//!
//! A closed mapping from `(status, body)` to [`Outcome`]. Error message
//! text is carried for diagnostics only and never drives the decision.

use crate::remote::SubResponse;
use crate::types::FailureKind;
use serde_json::Value;
use std::time::Duration;

/// Classified result of one sub-response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx
    Success,
    /// 409: the assignment is already in place
    AlreadyExists,
    /// 429: back off and resend
    RateLimited {
        /// Server-provided wait, if any
        retry_after: Option<Duration>,
    },
    /// 400/403/404: do not retry
    PermanentFailure {
        /// HTTP status
        code: u16,
        /// Diagnostic message
        message: String,
    },
    /// Anything else: retry with backoff
    TransientFailure {
        /// HTTP status (0 when synthesised locally)
        code: u16,
        /// Diagnostic message
        message: String,
    },
}

impl Outcome {
    /// Whether the item's target state is in place
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyExists)
    }
}

/// Failure kind for a permanent status code
pub const fn permanent_kind(code: u16) -> Option<FailureKind> {
    match code {
        400 => Some(FailureKind::InvalidRequest),
        403 => Some(FailureKind::Forbidden),
        404 => Some(FailureKind::NotFound),
        _ => None,
    }
}

/// Classify a response by status code
pub fn classify(response: &SubResponse) -> Outcome {
    let code = response.status;
    match code {
        200..=299 => Outcome::Success,
        409 => Outcome::AlreadyExists,
        429 => Outcome::RateLimited {
            retry_after: response.retry_after(),
        },
        _ => {
            let message = error_message(response.body.as_ref());
            match permanent_kind(code) {
                Some(kind) => Outcome::PermanentFailure {
                    code,
                    message: message.unwrap_or_else(|| kind.to_string()),
                },
                None => Outcome::TransientFailure {
                    code,
                    message: message.unwrap_or_else(|| format!("HTTP {code}")),
                },
            }
        }
    }
}

/// Pull `error.message` (or a bare `message`) out of an error body
fn error_message(body: Option<&Value>) -> Option<String> {
    let body = body?;
    body.get("error")
        .and_then(|e| e.get("message"))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(code: u16) -> Outcome {
        classify(&SubResponse::new("1", code))
    }

    fn label(outcome: &Outcome) -> &'static str {
        match outcome {
            Outcome::Success => "success",
            Outcome::AlreadyExists => "already-exists",
            Outcome::RateLimited { .. } => "rate-limited",
            Outcome::PermanentFailure { .. } => "permanent",
            Outcome::TransientFailure { .. } => "transient",
        }
    }

    #[test]
    fn test_status_code_table() {
        let cases = [
            (200, "success"),
            (201, "success"),
            (204, "success"),
            (409, "already-exists"),
            (429, "rate-limited"),
            (400, "permanent"),
            (403, "permanent"),
            (404, "permanent"),
            (401, "transient"),
            (500, "transient"),
            (502, "transient"),
            (503, "transient"),
        ];

        for (code, expected) in cases {
            assert_eq!(label(&status(code)), expected, "status {code}");
        }
    }

    #[test]
    fn test_already_exists_counts_as_success() {
        assert!(status(409).is_success());
        assert!(!status(429).is_success());
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let response = SubResponse::new("1", 429).with_header("Retry-After", "30");
        assert_eq!(
            classify(&response),
            Outcome::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
    }

    #[test]
    fn test_permanent_message_prefers_server_text() {
        let response = SubResponse::new("1", 400).with_body(json!({
            "error": { "code": "BadRequest", "message": "Filter not supported for target" }
        }));
        assert_eq!(
            classify(&response),
            Outcome::PermanentFailure {
                code: 400,
                message: "Filter not supported for target".into()
            }
        );
    }

    #[test]
    fn test_permanent_message_falls_back_to_kind() {
        assert_eq!(
            status(404),
            Outcome::PermanentFailure {
                code: 404,
                message: "artifact or target no longer exists".into()
            }
        );
        assert_eq!(
            status(403),
            Outcome::PermanentFailure {
                code: 403,
                message: "insufficient permission".into()
            }
        );
    }

    #[test]
    fn test_synthetic_response_is_transient() {
        let response = SubResponse::synthetic("1", "missing from batch response");
        assert_eq!(
            classify(&response),
            Outcome::TransientFailure {
                code: 0,
                message: "missing from batch response".into()
            }
        );
    }
}
