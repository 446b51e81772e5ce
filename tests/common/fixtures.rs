//! Test data factories for bulk-assign types
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use bulk_assign::clock::ManualClock;
use bulk_assign::config::EngineConfig;
use bulk_assign::error::{Error, Result};
use bulk_assign::submit::{Orchestrator, Phase, ProgressCallback, StateRefresher};
use bulk_assign::types::{
    ArtifactKind, ArtifactRef, AssignmentTarget, ExistingAssignment, Intent, WorkItem,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::MockAssignmentService;

pub const GROUP_G: &str = "0f3c2b1a-1111-4222-8333-944455556666";
pub const GROUP_H: &str = "1a2b3c4d-2222-4333-8444-a55566667777";

/// App artifact `app-{n}` named `App {n}`
pub fn make_app(n: usize) -> ArtifactRef {
    ArtifactRef::new(format!("app-{n}"), format!("App {n}"), ArtifactKind::App)
}

/// `count` apps, each assigned to all users as required
pub fn make_items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|n| WorkItem::new(&make_app(n), AssignmentTarget::AllUsers, Intent::Required))
        .collect()
}

/// Existing assignment record
pub fn make_existing(target: AssignmentTarget, intent: Intent) -> ExistingAssignment {
    ExistingAssignment {
        id: format!("existing-{target}"),
        target,
        intent,
        filter: None,
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Orchestrator on a manual clock with default engine settings
pub fn make_engine(service: &Arc<MockAssignmentService>) -> (Orchestrator, Arc<ManualClock>) {
    make_engine_with(service, EngineConfig::default())
}

pub fn make_engine_with(
    service: &Arc<MockAssignmentService>,
    config: EngineConfig,
) -> (Orchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let orchestrator = Orchestrator::new(service.clone(), config).with_clock(clock.clone());
    (orchestrator, clock)
}

/// Refresher that records the artifacts it was asked to refresh
#[derive(Default)]
pub struct RecordingRefresher {
    calls: Mutex<Vec<Vec<String>>>,
    fail_with: Option<String>,
}

impl RecordingRefresher {
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateRefresher for RecordingRefresher {
    async fn refresh(&self, artifacts: &[ArtifactRef]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(artifacts.iter().map(|a| a.id.clone()).collect());
        match &self.fail_with {
            Some(message) => Err(Error::GraphApi(message.clone())),
            None => Ok(()),
        }
    }
}

/// Progress callback recording phases and messages
#[derive(Default)]
pub struct RecordingProgress {
    phases: Mutex<Vec<Phase>>,
    finished: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressCallback for RecordingProgress {
    async fn on_phase(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }

    async fn on_item_finished(&self, item: &WorkItem) {
        self.finished.lock().unwrap().push(item.artifact_id.clone());
    }

    async fn on_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
