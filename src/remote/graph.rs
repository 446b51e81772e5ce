//! Microsoft Graph implementation of [`AssignmentService`]

use crate::error::{Error, Result};
use crate::remote::payload::{assignments_path, parse_assignment};
use crate::remote::{AssignmentService, SubRequest, SubResponse};
use crate::types::{ArtifactRef, ExistingAssignment};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Graph service using reqwest
pub struct GraphService {
    client: Client,
    token: String,
    base_url: String,
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    requests: &'a [SubRequest],
}

#[derive(Deserialize)]
struct BatchResponseBody {
    responses: Vec<SubResponse>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

impl GraphService {
    /// Create a new Graph service
    pub fn new(token: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bulk-assign/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Graph base URL this service talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        // nextLink values are absolute
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl AssignmentService for GraphService {
    async fn submit_batch(&self, requests: &[SubRequest]) -> Result<Vec<SubResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = requests.len(), "POST $batch");
        let response = self
            .client
            .post(self.url("/$batch"))
            .bearer_auth(&self.token)
            .json(&BatchPayload { requests })
            .send()
            .await?;

        let status = response.status();

        // Throttling of the envelope itself applies to every sub-request
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            return Ok(requests
                .iter()
                .map(|r| {
                    let sub = SubResponse::new(&r.id, status.as_u16());
                    match &retry_after {
                        Some(ra) => sub.with_header("Retry-After", ra.clone()),
                        None => sub,
                    }
                })
                .collect());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GraphApi(format!(
                "batch request failed with {status}: {body}"
            )));
        }

        let body: BatchResponseBody = response.json().await?;
        Ok(body.responses)
    }

    async fn submit_one(&self, request: &SubRequest) -> Result<SubResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("bad HTTP method {}: {e}", request.method)))?;

        debug!(method = %method, url = %request.url, "single request");
        let mut builder = self
            .client
            .request(method, self.url(&request.url))
            .bearer_auth(&self.token);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        Ok(SubResponse {
            id: request.id.clone(),
            status,
            headers,
            body,
        })
    }

    async fn list_assignments(&self, artifact: &ArtifactRef) -> Result<Vec<ExistingAssignment>> {
        let mut url = self.url(&assignments_path(artifact.kind, &artifact.id));
        let mut assignments = Vec::new();

        loop {
            let page: Page = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?
                .error_for_status()
                .map_err(|e| Error::GraphApi(e.to_string()))?
                .json()
                .await?;

            assignments.extend(page.value.iter().filter_map(parse_assignment));

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(
            artifact = %artifact.id,
            count = assignments.len(),
            "listed assignments"
        );
        Ok(assignments)
    }
}
