//! Assign command - bulk-assign artifacts to targets

use crate::cli::progress::CliProgress;
use crate::cli::report::{print_plan, print_plan_json, print_run, print_run_json};
use crate::cli::style::{spinner_style, Stylize};
use anstream::println;
use bulk_assign::config::Config;
use bulk_assign::error::{Error, Result};
use bulk_assign::remote::{create_assignment_service, fetch_assignment_index, ServiceRefresher};
use bulk_assign::submit::{create_submission_plan, Orchestrator};
use bulk_assign::types::{
    cross_product, ArtifactKind, ArtifactRef, AssignmentFilter, AssignmentTarget, FilterMode,
    Intent,
};
use dialoguer::Confirm;
use indicatif::ProgressBar;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Exit code when the run finished but some items did not succeed
const PARTIAL_FAILURE_EXIT: u8 = 2;

/// Options for the assign command
#[derive(Debug, Clone)]
pub struct AssignOptions {
    /// Kind of every artifact
    pub kind: ArtifactKind,
    /// Artifacts as `id` or `id=name`
    pub artifacts: Vec<String>,
    /// Targets to assign to
    pub targets: Vec<AssignmentTarget>,
    /// Requested intent; defaults per kind
    pub intent: Option<Intent>,
    /// Assignment filter id
    pub filter: Option<String>,
    /// How the filter applies
    pub filter_mode: FilterMode,
    /// Only show the plan
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Cancel the run after this long
    pub timeout: Option<Duration>,
    /// Emit JSON instead of styled output
    pub json: bool,
}

/// Parse `id` or `id=name`
pub fn parse_artifact(raw: &str, kind: ArtifactKind) -> Result<ArtifactRef> {
    let (id, name) = match raw.split_once('=') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (raw.trim(), raw.trim()),
    };
    if id.is_empty() {
        return Err(Error::InvalidInput(format!("empty artifact id in {raw:?}")));
    }
    let name = if name.is_empty() { id } else { name };
    Ok(ArtifactRef::new(id, name, kind))
}

/// Pick the intent for `kind`, rejecting combinations Graph does not accept
pub fn resolve_intent(kind: ArtifactKind, requested: Option<Intent>) -> Result<Intent> {
    let intent = requested.unwrap_or_else(|| kind.default_intent());
    match (kind.supports_intent(), intent) {
        (true, Intent::Apply) => Err(Error::InvalidInput(
            "apps need an install intent (required, available, uninstall...)".to_string(),
        )),
        (false, i) if i != Intent::Apply => Err(Error::InvalidInput(format!(
            "{kind} assignments have no intent; omit --intent or use 'apply'"
        ))),
        _ => Ok(intent),
    }
}

/// Run the assign command
pub async fn run_assign(config: &Config, opts: AssignOptions) -> Result<ExitCode> {
    let artifacts = opts
        .artifacts
        .iter()
        .map(|raw| parse_artifact(raw, opts.kind))
        .collect::<Result<Vec<_>>>()?;
    if artifacts.is_empty() || opts.targets.is_empty() {
        return Err(Error::InvalidInput(
            "at least one --artifact and one --target are required".to_string(),
        ));
    }
    let intent = resolve_intent(opts.kind, opts.intent)?;
    let filter = opts.filter.clone().map(|id| AssignmentFilter {
        id,
        mode: opts.filter_mode,
    });

    let items = cross_product(&artifacts, &opts.targets, intent, filter.as_ref());
    debug!(items = items.len(), "built work items");

    let service = create_assignment_service(config).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message("Reading current assignments...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    let index = fetch_assignment_index(service.as_ref(), &artifacts).await;
    spinner.finish_and_clear();

    let index = Arc::new(Mutex::new(index));
    let refresher = Arc::new(ServiceRefresher::new(service.clone(), index.clone()));
    let known = index
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();

    let plan = create_submission_plan(items.clone(), &known, config.engine.batch_limit);
    if opts.dry_run {
        if opts.json {
            print_plan_json(&plan)?;
        } else {
            println!("{}", "Dry run - no changes will be made".muted());
            print_plan(&plan);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if plan.is_noop() {
        if !opts.json {
            println!("Nothing to do: every assignment is already in place");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !opts.yes {
        if !opts.json {
            print_plan(&plan);
            println!();
        }
        let proceed = Confirm::new()
            .with_prompt(format!("Create {} assignments?", plan.submit_count()))
            .default(false)
            .interact()
            .map_err(|e| Error::Internal(format!("prompt failed: {e}")))?;
        if !proceed {
            println!("Aborted");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let progress = Arc::new(CliProgress::new(items.len(), opts.json));
    let orchestrator = Orchestrator::new(service, config.engine.clone())
        .with_refresher(refresher)
        .with_progress_callback(progress.clone());

    let cancel = orchestrator.cancellation_token();
    let watcher = {
        let cancel = cancel.clone();
        let timeout = opts.timeout;
        tokio::spawn(async move {
            let deadline = async {
                match timeout {
                    Some(t) => tokio::time::sleep(t).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => warn!("interrupted, cancelling run"),
                () = deadline => warn!("timeout reached, cancelling run"),
                () = cancel.cancelled() => return,
            }
            cancel.cancel();
        })
    };

    let outcome = orchestrator.run(items, &known).await;
    progress.finish();
    watcher.abort();
    let result = outcome?;

    if opts.json {
        print_run_json(&result)?;
    } else {
        print_run(&result);
    }

    Ok(if result.partial_failure().is_some() {
        ExitCode::from(PARTIAL_FAILURE_EXIT)
    } else {
        ExitCode::SUCCESS
    })
}
