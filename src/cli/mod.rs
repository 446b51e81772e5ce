//! CLI commands
//!
//! Command implementations for the `bulk-assign` binary.

mod assign;
mod auth;
mod list;
mod progress;
mod report;
pub mod style;

pub use assign::{run_assign, AssignOptions};
pub use auth::{run_auth_setup, run_auth_test};
pub use list::run_list;
