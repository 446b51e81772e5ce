//! Assignment service factory
//!
//! Creates the Graph service from configuration.

use crate::auth::get_graph_auth;
use crate::config::Config;
use crate::error::Result;
use crate::remote::{AssignmentService, GraphService};
use std::sync::Arc;

/// Create an assignment service from configuration
///
/// Handles token discovery and client construction.
pub async fn create_assignment_service(config: &Config) -> Result<Arc<dyn AssignmentService>> {
    let auth = get_graph_auth().await?;
    Ok(Arc::new(GraphService::new(
        auth.token,
        config.base_url(),
        config.request_timeout(),
    )?))
}
