//! Loading and refreshing known assignments

use crate::error::Result;
use crate::remote::AssignmentService;
use crate::submit::{AssignmentIndex, StateRefresher};
use crate::types::ArtifactRef;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// List the current assignments of every artifact
///
/// Best-effort: an artifact whose listing fails is left out of the index,
/// which the validator treats as a cache miss.
pub async fn fetch_assignment_index(
    service: &dyn AssignmentService,
    artifacts: &[ArtifactRef],
) -> AssignmentIndex {
    let mut index = AssignmentIndex::new();
    for artifact in artifacts {
        match service.list_assignments(artifact).await {
            Ok(assignments) => index.insert(&artifact.id, assignments),
            Err(e) => warn!(
                artifact = %artifact.id,
                error = %e,
                "could not list assignments, submitting without dedup"
            ),
        }
    }
    index
}

/// [`StateRefresher`] that re-lists touched artifacts into a shared index
pub struct ServiceRefresher {
    service: Arc<dyn AssignmentService>,
    index: Arc<Mutex<AssignmentIndex>>,
}

impl ServiceRefresher {
    /// Create a refresher writing into `index`
    pub fn new(service: Arc<dyn AssignmentService>, index: Arc<Mutex<AssignmentIndex>>) -> Self {
        Self { service, index }
    }

    /// Shared index this refresher updates
    pub fn index(&self) -> Arc<Mutex<AssignmentIndex>> {
        self.index.clone()
    }
}

#[async_trait]
impl StateRefresher for ServiceRefresher {
    async fn refresh(&self, artifacts: &[ArtifactRef]) -> Result<()> {
        for artifact in artifacts {
            let listed = self.service.list_assignments(artifact).await;
            let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            match listed {
                Ok(assignments) => index.insert(&artifact.id, assignments),
                Err(e) => {
                    // Forget stale state so the next lookup is a cache miss.
                    index.invalidate(&artifact.id);
                    return Err(e);
                }
            }
        }
        debug!(artifacts = artifacts.len(), "assignment index refreshed");
        Ok(())
    }
}
