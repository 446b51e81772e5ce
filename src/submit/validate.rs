//! Validation and deduplication
//!
//! Drops work items the remote side already satisfies. The cache is an
//! optimisation only: when it has nothing for an artifact, the item is
//! submitted and a 409 on the wire settles it.

use crate::types::{ExistingAssignment, WorkItem};
use std::collections::HashMap;

/// Message recorded on items skipped because the assignment exists
pub const ALREADY_EXISTS_SKIPPED: &str = "already exists (skipped)";

/// Known remote assignments, keyed by artifact id
#[derive(Debug, Clone, Default)]
pub struct AssignmentIndex {
    by_artifact: HashMap<String, Vec<ExistingAssignment>>,
}

impl AssignmentIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known assignments of one artifact
    pub fn insert(&mut self, artifact_id: impl Into<String>, assignments: Vec<ExistingAssignment>) {
        self.by_artifact.insert(artifact_id.into(), assignments);
    }

    /// Forget an artifact, turning lookups into cache misses
    pub fn invalidate(&mut self, artifact_id: &str) {
        self.by_artifact.remove(artifact_id);
    }

    /// Known assignments of an artifact; `None` is a cache miss
    pub fn get(&self, artifact_id: &str) -> Option<&[ExistingAssignment]> {
        self.by_artifact.get(artifact_id).map(Vec::as_slice)
    }

    /// Number of artifacts with known state
    pub fn len(&self) -> usize {
        self.by_artifact.len()
    }

    /// Whether no artifact has known state
    pub fn is_empty(&self) -> bool {
        self.by_artifact.is_empty()
    }

    /// Whether an existing assignment already covers `item`
    ///
    /// Same target (pseudo-targets compare by kind) and same intent.
    pub fn satisfies(&self, item: &WorkItem) -> bool {
        self.get(&item.artifact_id).is_some_and(|existing| {
            existing
                .iter()
                .any(|a| a.target == item.target && a.intent == item.intent)
        })
    }
}

/// Outcome of validation
#[derive(Debug, Clone, Default)]
pub struct Validation {
    /// Items already satisfied, marked `completed`
    pub skip: Vec<WorkItem>,
    /// Items to send, in input order
    pub submit: Vec<WorkItem>,
}

/// Split `items` into already-satisfied and to-submit
pub fn validate(items: Vec<WorkItem>, known: &AssignmentIndex) -> Validation {
    let mut validation = Validation::default();

    for mut item in items {
        if known.satisfies(&item) {
            item.mark_completed(Some(ALREADY_EXISTS_SKIPPED));
            validation.skip.push(item);
        } else {
            validation.submit.push(item);
        }
    }

    validation
}
