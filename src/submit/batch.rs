//! Batching and request envelopes

use crate::config::MAX_BATCH_LIMIT;
use crate::remote::{assignment_request, SubRequest, SubResponse};
use crate::types::WorkItem;
use std::collections::HashMap;
use tracing::warn;

/// Partition `items` into batches of at most `size`, preserving order
///
/// `size` is clamped to the `$batch` limit. Empty input yields no batches.
pub fn chunk(items: Vec<WorkItem>, size: usize) -> Vec<Vec<WorkItem>> {
    let size = size.clamp(1, MAX_BATCH_LIMIT);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();

    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }

    batches
}

/// Ordered sub-requests for one batch
///
/// Sub-request ids are the 1-based positions of the items, so responses
/// can be mapped back whatever order the server returns them in.
#[derive(Debug, Clone)]
pub struct BatchEnvelope {
    requests: Vec<SubRequest>,
}

impl BatchEnvelope {
    /// Build an envelope for `items`, in order
    pub fn new<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let requests = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| assignment_request(item, (idx + 1).to_string()))
            .collect();
        Self { requests }
    }

    /// Sub-requests in envelope order
    pub fn requests(&self) -> &[SubRequest] {
        &self.requests
    }

    /// Number of sub-requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the envelope is empty
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Map responses back to envelope order
    ///
    /// Exactly one response per request is returned. Requests the server
    /// did not answer get a synthetic transient failure; unknown or
    /// duplicate ids are dropped.
    pub fn correlate(&self, responses: Vec<SubResponse>) -> Vec<SubResponse> {
        let mut by_id: HashMap<String, SubResponse> = HashMap::with_capacity(responses.len());
        for response in responses {
            if !self.requests.iter().any(|r| r.id == response.id) {
                warn!(id = %response.id, "dropping response for unknown sub-request");
                continue;
            }
            if by_id.contains_key(&response.id) {
                warn!(id = %response.id, "dropping duplicate response");
                continue;
            }
            by_id.insert(response.id.clone(), response);
        }

        self.requests
            .iter()
            .map(|request| {
                by_id.remove(&request.id).unwrap_or_else(|| {
                    SubResponse::synthetic(&request.id, "missing from batch response")
                })
            })
            .collect()
    }
}
