//! Submission planning
//!
//! Validation plus batching, without touching the network. Backs dry runs
//! and gives the orchestrator its batch list.

use crate::submit::batch::chunk;
use crate::submit::validate::{validate, AssignmentIndex};
use crate::types::WorkItem;

/// What a run would do
#[derive(Debug, Clone, Default)]
pub struct SubmissionPlan {
    /// Items already satisfied remotely, marked `completed`
    pub skipped: Vec<WorkItem>,
    /// Items to send, in dispatch order
    pub batches: Vec<Vec<WorkItem>>,
}

impl SubmissionPlan {
    /// Number of items that would be sent
    pub fn submit_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Total items covered by the plan
    pub fn total(&self) -> usize {
        self.skipped.len() + self.submit_count()
    }

    /// Whether nothing needs sending
    pub fn is_noop(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Create a submission plan
///
/// Duplicates of known assignments are skipped; the rest is chunked into
/// batches of at most `batch_limit`.
pub fn create_submission_plan(
    items: Vec<WorkItem>,
    known: &AssignmentIndex,
    batch_limit: usize,
) -> SubmissionPlan {
    let validation = validate(items, known);
    SubmissionPlan {
        skipped: validation.skip,
        batches: chunk(validation.submit, batch_limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactKind, ArtifactRef, AssignmentTarget, ExistingAssignment, Intent};

    fn artifacts(n: usize) -> Vec<ArtifactRef> {
        (0..n)
            .map(|i| ArtifactRef::new(format!("app-{i}"), format!("App {i}"), ArtifactKind::App))
            .collect()
    }

    #[test]
    fn test_plan_skips_then_chunks() {
        let apps = artifacts(25);
        let items: Vec<WorkItem> = apps
            .iter()
            .map(|a| WorkItem::new(a, AssignmentTarget::AllUsers, Intent::Required))
            .collect();

        let mut known = AssignmentIndex::new();
        known.insert(
            "app-3",
            vec![ExistingAssignment {
                id: "existing".into(),
                target: AssignmentTarget::AllUsers,
                intent: Intent::Required,
                filter: None,
            }],
        );

        let plan = create_submission_plan(items, &known, 20);

        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].artifact_id, "app-3");
        assert_eq!(
            plan.batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![20, 4]
        );
        assert_eq!(plan.submit_count(), 24);
        assert_eq!(plan.total(), 25);
        assert!(
            plan.batches
                .iter()
                .flatten()
                .all(|item| item.artifact_id != "app-3")
        );
    }

    #[test]
    fn test_empty_plan_is_noop() {
        let plan = create_submission_plan(Vec::new(), &AssignmentIndex::new(), 20);
        assert!(plan.is_noop());
        assert_eq!(plan.total(), 0);
    }
}
