//! Auth command - test and explain Graph authentication

use crate::cli::style::{check, Stylize};
use anstream::println;
use bulk_assign::auth::{decode_claims, get_graph_auth, test_graph_auth};
use bulk_assign::config::Config;
use bulk_assign::error::Result;

/// Run the auth test command
pub async fn run_auth_test(config: &Config) -> Result<()> {
    println!("Testing Microsoft Graph authentication...");
    let auth = get_graph_auth().await?;
    println!("Token source: {:?}", auth.source);

    match decode_claims(&auth.token) {
        Ok(claims) => {
            println!("Identity: {}", claims.identity().accent());
            if let Some(tenant) = &claims.tid {
                println!("Tenant id: {}", tenant.muted());
            }
            if let Some(expires) = claims.expires_at() {
                let note = if claims.is_expired() { " (expired)" } else { "" };
                println!("Expires: {expires}{note}");
            }
            if let Some(scopes) = &claims.scp {
                println!("Scopes: {}", scopes.muted());
            }
            if !claims.roles.is_empty() {
                println!("Roles: {}", claims.roles.join(" ").muted());
            }
        }
        Err(e) => println!("{}", format!("Could not decode token claims: {e}").muted()),
    }

    let tenant = test_graph_auth(&auth, config.base_url()).await?;
    println!("{} Authenticated against {}", check(), tenant.emphasis());
    Ok(())
}

/// Run the auth setup command (show instructions)
pub fn run_auth_setup() {
    println!("Microsoft Graph Authentication Setup");
    println!("====================================");
    println!();
    println!("Option 1: Azure CLI (recommended)");
    println!("  Install: https://learn.microsoft.com/cli/azure/install-azure-cli");
    println!("  Run: az login --allow-no-subscriptions");
    println!();
    println!("Option 2: Environment variable");
    println!("  Set GRAPH_TOKEN or AZURE_ACCESS_TOKEN to a Graph access token");
    println!();
    println!("Required permissions:");
    println!("  DeviceManagementApps.ReadWrite.All");
    println!("  DeviceManagementConfiguration.ReadWrite.All");
}
