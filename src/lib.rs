//! bulk-assign - bulk Intune assignments over Microsoft Graph
//!
//! The library holds the bulk operation engine ([`submit`]), the Graph
//! transport ([`remote`]), token discovery ([`auth`]) and configuration
//! ([`config`]). The `bulk-assign` binary is a thin CLI over these.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod remote;
pub mod submit;
pub mod types;
