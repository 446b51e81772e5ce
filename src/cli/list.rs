//! List command - show the current assignments of an artifact

use crate::cli::style::{arrow, Stylize};
use anstream::println;
use bulk_assign::config::Config;
use bulk_assign::error::Result;
use bulk_assign::remote::create_assignment_service;
use bulk_assign::types::{ArtifactKind, ArtifactRef, FilterMode};

/// Run the list command
pub async fn run_list(config: &Config, kind: ArtifactKind, artifact_id: &str, json: bool) -> Result<()> {
    let service = create_assignment_service(config).await?;
    let artifact = ArtifactRef::new(artifact_id, artifact_id, kind);
    let assignments = service.list_assignments(&artifact).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&assignments)?);
        return Ok(());
    }

    if assignments.is_empty() {
        println!("No assignments for {} {}", kind, artifact_id.accent());
        return Ok(());
    }

    println!(
        "{} assignment{} for {} {}:",
        assignments.len().accent(),
        if assignments.len() == 1 { "" } else { "s" },
        kind,
        artifact_id.accent()
    );
    for assignment in &assignments {
        let filter = assignment.filter.as_ref().map_or_else(String::new, |f| {
            let mode = match f.mode {
                FilterMode::Include => "include",
                FilterMode::Exclude => "exclude",
            };
            format!(" [filter {mode} {}]", f.id)
        });
        println!(
            "  {} {} {}{}",
            arrow(),
            assignment.target.accent(),
            format!("({})", assignment.intent).muted(),
            filter.muted()
        );
    }
    Ok(())
}
