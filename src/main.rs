//! bulk-assign - bulk Intune assignments through Microsoft Graph
//!
//! CLI binary for assigning many apps or policies to many groups at once.

use anyhow::Result;
use bulk_assign::config::Config;
use bulk_assign::types::{ArtifactKind, AssignmentTarget, FilterMode, Intent};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::style::Stylize;

#[derive(Parser)]
#[command(name = "bulk-assign")]
#[command(about = "Bulk-assign Intune apps and policies to groups via Microsoft Graph")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign artifacts to targets (every artifact x every target)
    Assign {
        /// Artifact kind: app, device-configuration, configuration-policy, compliance-policy
        #[arg(long)]
        kind: ArtifactKind,

        /// Artifact id, optionally with a display name (`id=name`)
        #[arg(long = "artifact", required = true)]
        artifacts: Vec<String>,

        /// Group id, `exclude:<group id>`, `all-users` or `all-devices`
        #[arg(long = "target", required = true)]
        targets: Vec<AssignmentTarget>,

        /// Install intent for apps (required, available, available-without-enrollment, uninstall)
        #[arg(long)]
        intent: Option<Intent>,

        /// Assignment filter id
        #[arg(long)]
        filter: Option<String>,

        /// Whether the filter includes or excludes matching devices
        #[arg(long, default_value = "include", requires = "filter")]
        filter_mode: FilterMode,

        /// Dry run - show what would be done without making changes
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the current assignments of an artifact
    List {
        /// Artifact kind
        #[arg(long)]
        kind: ArtifactKind,

        /// Artifact id
        #[arg(long)]
        artifact: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Authentication management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Test authentication
    Test,
    /// Show authentication setup instructions
    Setup,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "bulk_assign=debug,info",
        _ => "bulk_assign=trace,debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Auth {
        action: AuthAction::Setup,
    } = cli.command
    {
        cli::run_auth_setup();
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Assign {
            kind,
            artifacts,
            targets,
            intent,
            filter,
            filter_mode,
            dry_run,
            yes,
            timeout,
            json,
        } => {
            let opts = cli::AssignOptions {
                kind,
                artifacts,
                targets,
                intent,
                filter,
                filter_mode,
                dry_run,
                yes,
                timeout: timeout.map(Duration::from_secs),
                json,
            };
            Ok(cli::run_assign(&config, opts).await?)
        }
        Commands::List {
            kind,
            artifact,
            json,
        } => {
            cli::run_list(&config, kind, &artifact, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Auth { action } => {
            match action {
                AuthAction::Test => cli::run_auth_test(&config).await?,
                AuthAction::Setup => cli::run_auth_setup(),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            anstream::eprintln!("{}: {e:#}", "error".error());
            ExitCode::FAILURE
        }
    }
}
