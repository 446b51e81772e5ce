//! Authentication for Microsoft Graph
//!
//! Supports Azure CLI tokens (`az`) and environment variables.

mod graph;

pub use graph::{decode_claims, get_graph_auth, test_graph_auth, GraphAuthConfig, TokenClaims};

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token from the Azure CLI
    Cli,
    /// Token from environment variable
    EnvVar,
}
