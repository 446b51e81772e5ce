//! Shared helpers for integration tests

pub mod fixtures;
pub mod mock_service;

pub use fixtures::*;
pub use mock_service::MockAssignmentService;
