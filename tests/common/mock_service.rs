//! Mock assignment service for testing
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use bulk_assign::error::{Error, Result};
use bulk_assign::remote::{AssignmentService, SubRequest, SubResponse};
use bulk_assign::types::{ArtifactRef, ExistingAssignment};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Hand-written mock of [`AssignmentService`]
///
/// Features:
/// - Scripted replies per artifact id, consumed one per wire attempt
///   (batch sub-request or single request); unscripted attempts get 201
/// - Call tracking for verification
/// - Transport error injection per `submit_batch` call index
/// - Cancelling a token after a number of batch calls
pub struct MockAssignmentService {
    scripts: Mutex<HashMap<String, VecDeque<SubResponse>>>,
    list_responses: Mutex<HashMap<String, Vec<ExistingAssignment>>>,
    reverse_batch_responses: Mutex<bool>,
    // Call tracking
    batch_calls: Mutex<Vec<Vec<SubRequest>>>,
    single_calls: Mutex<Vec<SubRequest>>,
    list_calls: Mutex<Vec<String>>,
    // Error injection
    failing_batch_calls: Mutex<HashSet<usize>>,
    failing_lists: Mutex<HashSet<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl Default for MockAssignmentService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAssignmentService {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            list_responses: Mutex::new(HashMap::new()),
            reverse_batch_responses: Mutex::new(false),
            batch_calls: Mutex::new(Vec::new()),
            single_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
            failing_batch_calls: Mutex::new(HashSet::new()),
            failing_lists: Mutex::new(HashSet::new()),
            cancel_after: Mutex::new(None),
        }
    }

    // === Scripting ===

    /// Reply with these statuses to the next attempts for `artifact_id`
    pub fn script(&self, artifact_id: &str, statuses: &[u16]) {
        self.script_responses(
            artifact_id,
            statuses.iter().map(|s| SubResponse::new("", *s)).collect(),
        );
    }

    /// Reply with these responses (ids are rewritten) to the next attempts
    pub fn script_responses(&self, artifact_id: &str, responses: Vec<SubResponse>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(artifact_id.to_string())
            .or_default()
            .extend(responses);
    }

    /// Return batch responses in reverse order
    pub fn reverse_batch_responses(&self) {
        *self.reverse_batch_responses.lock().unwrap() = true;
    }

    /// Set what `list_assignments` returns for an artifact
    pub fn set_assignments(&self, artifact_id: &str, assignments: Vec<ExistingAssignment>) {
        self.list_responses
            .lock()
            .unwrap()
            .insert(artifact_id.to_string(), assignments);
    }

    // === Error injection ===

    /// Make the given `submit_batch` calls (0-based) fail at the transport level
    pub fn fail_batch_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.failing_batch_calls.lock().unwrap().extend(calls);
    }

    /// Make `list_assignments` fail for an artifact
    pub fn fail_list(&self, artifact_id: &str) {
        self.failing_lists
            .lock()
            .unwrap()
            .insert(artifact_id.to_string());
    }

    /// Cancel `token` once `batches` batch calls have been answered
    pub fn cancel_after_batches(&self, batches: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((batches, token));
    }

    // === Call verification ===

    /// Every `submit_batch` call, in order
    pub fn batch_calls(&self) -> Vec<Vec<SubRequest>> {
        self.batch_calls.lock().unwrap().clone()
    }

    /// Sizes of every `submit_batch` call, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_calls().iter().map(Vec::len).collect()
    }

    /// Every `submit_one` call, in order
    pub fn single_calls(&self) -> Vec<SubRequest> {
        self.single_calls.lock().unwrap().clone()
    }

    /// Artifact ids passed to `list_assignments`
    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    /// Artifact ids of every sub-request sent in a batch
    pub fn batched_artifacts(&self) -> Vec<String> {
        self.batch_calls()
            .iter()
            .flatten()
            .map(|r| artifact_of(r).to_string())
            .collect()
    }

    /// Assert that no request for `artifact_id` reached the wire
    pub fn assert_never_sent(&self, artifact_id: &str) {
        let batched = self.batched_artifacts();
        let singles: Vec<String> = self
            .single_calls()
            .iter()
            .map(|r| artifact_of(r).to_string())
            .collect();
        assert!(
            !batched.iter().chain(&singles).any(|a| a == artifact_id),
            "Expected {artifact_id} never to be sent but got batches {batched:?}, singles {singles:?}"
        );
    }

    fn reply(&self, request: &SubRequest) -> SubResponse {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(artifact_of(request))
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(mut response) => {
                response.id.clone_from(&request.id);
                response
            }
            None => SubResponse::new(&request.id, 201),
        }
    }
}

/// Artifact id from `.../{artifact id}/assignments`
fn artifact_of(request: &SubRequest) -> &str {
    request.url.rsplit('/').nth(1).unwrap_or_default()
}

#[async_trait]
impl AssignmentService for MockAssignmentService {
    async fn submit_batch(&self, requests: &[SubRequest]) -> Result<Vec<SubResponse>> {
        let call_index = {
            let mut calls = self.batch_calls.lock().unwrap();
            calls.push(requests.to_vec());
            calls.len() - 1
        };

        // Check for injected error
        if self.failing_batch_calls.lock().unwrap().contains(&call_index) {
            return Err(Error::Transport("connection reset".to_string()));
        }

        let mut responses: Vec<SubResponse> = requests.iter().map(|r| self.reply(r)).collect();
        if *self.reverse_batch_responses.lock().unwrap() {
            responses.reverse();
        }

        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if call_index + 1 >= *after {
                token.cancel();
            }
        }

        Ok(responses)
    }

    async fn submit_one(&self, request: &SubRequest) -> Result<SubResponse> {
        self.single_calls.lock().unwrap().push(request.clone());
        Ok(self.reply(request))
    }

    async fn list_assignments(&self, artifact: &ArtifactRef) -> Result<Vec<ExistingAssignment>> {
        self.list_calls.lock().unwrap().push(artifact.id.clone());

        if self.failing_lists.lock().unwrap().contains(&artifact.id) {
            return Err(Error::GraphApi(format!("listing {} failed", artifact.id)));
        }

        Ok(self
            .list_responses
            .lock()
            .unwrap()
            .get(&artifact.id)
            .cloned()
            .unwrap_or_default())
    }
}
