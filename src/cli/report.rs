//! Run reports: styled per-item lines or JSON

use crate::cli::style::{arrow, check, cross, dash, Stylize};
use anstream::println;
use bulk_assign::submit::{RunResult, SubmissionPlan, ALREADY_EXISTS_SKIPPED};
use bulk_assign::types::{ItemStatus, WorkItem};
use serde::Serialize;
use std::fmt::Write;

#[derive(Serialize)]
struct ItemReport<'a> {
    artifact_id: &'a str,
    artifact_name: &'a str,
    target: String,
    target_name: &'a str,
    intent: String,
    status: String,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl<'a> From<&'a WorkItem> for ItemReport<'a> {
    fn from(item: &'a WorkItem) -> Self {
        Self {
            artifact_id: &item.artifact_id,
            artifact_name: &item.artifact_name,
            target: item.target.to_string(),
            target_name: &item.target_name,
            intent: item.intent.to_string(),
            status: item.status.to_string(),
            attempts: item.attempt_count,
            message: item.last_error.as_deref(),
            failure: item.failure_kind.map(|k| k.to_string()),
        }
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    total: usize,
    successful: usize,
    failed: usize,
    cancelled: usize,
    skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_error: Option<&'a str>,
    items: Vec<ItemReport<'a>>,
}

/// Print the per-item report and the summary line
pub fn print_run(result: &RunResult) {
    println!();
    for item in result.items() {
        print_item(item);
    }
    println!();

    if let Some(message) = &result.refresh_error {
        println!("{} {}", "warning:".warn().for_stdout(), message);
    }

    let summary = format!(
        "{} succeeded ({} already assigned), {} failed, {} cancelled",
        result.successful.len(),
        result.skipped_count,
        result.failed.len(),
        result.cancelled.len()
    );
    match result.partial_failure() {
        None => println!("{} {}", check(), summary.emphasis()),
        Some(err) => {
            println!("{} {}", cross(), summary.emphasis());
            println!("{}", err.to_string().error().for_stdout());
        }
    }
}

fn print_item(item: &WorkItem) {
    let marker = match item.status {
        ItemStatus::Completed if item.last_error.as_deref() == Some(ALREADY_EXISTS_SKIPPED) => {
            dash().to_string()
        }
        ItemStatus::Completed => check().to_string(),
        ItemStatus::Failed => cross().to_string(),
        _ => dash().to_string(),
    };

    let mut line = format!(
        "  {marker} {} {} {} {}",
        item.artifact_name.accent(),
        arrow(),
        item.target_name,
        format!("({})", item.intent).muted()
    );
    if let Some(message) = &item.last_error {
        let _ = write!(line, " {}", message.muted());
    }
    println!("{line}");
}

/// Print the run as JSON
pub fn print_run_json(result: &RunResult) -> serde_json::Result<()> {
    let report = RunReport {
        total: result.total(),
        successful: result.successful.len(),
        failed: result.failed.len(),
        cancelled: result.cancelled.len(),
        skipped: result.skipped_count,
        refresh_error: result.refresh_error.as_deref(),
        items: result.items().map(ItemReport::from).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print what a run would do without sending anything
pub fn print_plan(plan: &SubmissionPlan) {
    println!(
        "{} assignment{} to create in {} batch{}, {} already in place",
        plan.submit_count().accent(),
        if plan.submit_count() == 1 { "" } else { "s" },
        plan.batches.len().accent(),
        if plan.batches.len() == 1 { "" } else { "es" },
        plan.skipped.len().accent()
    );

    for (idx, batch) in plan.batches.iter().enumerate() {
        println!();
        println!("  {}", format!("Batch {}", idx + 1).emphasis());
        for item in batch {
            println!(
                "    {} {} {} {}",
                arrow(),
                item.artifact_name.accent(),
                item.target_name,
                format!("({})", item.intent).muted()
            );
        }
    }

    if !plan.skipped.is_empty() {
        println!();
        println!("  {}", "Skipped".emphasis());
        for item in &plan.skipped {
            println!(
                "    {} {} {}",
                dash(),
                item.artifact_name.accent(),
                item.target_name.muted()
            );
        }
    }
}

/// Print the dry-run plan as JSON
pub fn print_plan_json(plan: &SubmissionPlan) -> serde_json::Result<()> {
    #[derive(Serialize)]
    struct PlanReport<'a> {
        skipped: Vec<ItemReport<'a>>,
        batches: Vec<Vec<ItemReport<'a>>>,
    }

    let report = PlanReport {
        skipped: plan.skipped.iter().map(ItemReport::from).collect(),
        batches: plan
            .batches
            .iter()
            .map(|b| b.iter().map(ItemReport::from).collect())
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
