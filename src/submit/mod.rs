//! Bulk operation engine
//!
//! Turns a list of artifact x target work items into Graph writes:
//! 1. Validation - drop items the remote side already satisfies
//! 2. Planning - chunk the rest into `$batch`-sized envelopes
//! 3. Execution - send batches under rate-limit backpressure, retrying
//!    what can be retried
//! 4. Verification - settle, then refresh remote state

mod batch;
mod classify;
mod execute;
mod orchestrate;
mod plan;
mod progress;
mod rate_limit;
mod validate;

pub use batch::{chunk, BatchEnvelope};
pub use classify::{classify, permanent_kind, Outcome};
pub use execute::{backoff, BatchExecutor, BatchRun, ALREADY_EXISTS};
pub use orchestrate::{Orchestrator, RunResult, StateRefresher};
pub use plan::{create_submission_plan, SubmissionPlan};
pub use progress::{NoopProgress, Phase, ProgressCallback, ProgressReporter, ProgressSnapshot};
pub use rate_limit::RateLimitCoordinator;
pub use validate::{validate, AssignmentIndex, Validation, ALREADY_EXISTS_SKIPPED};
