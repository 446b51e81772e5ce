//! Graph token discovery and verification

use crate::auth::AuthSource;
use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tokio::process::Command;

/// Graph authentication configuration
#[derive(Debug, Clone)]
pub struct GraphAuthConfig {
    /// Bearer token
    pub token: String,
    /// Where the token was obtained from
    pub source: AuthSource,
}

/// Identity claims carried by an access token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// User principal name (delegated tokens)
    pub upn: Option<String>,
    /// Application id (app-only tokens)
    pub appid: Option<String>,
    /// Tenant id
    pub tid: Option<String>,
    /// Expiry, seconds since the epoch
    pub exp: Option<i64>,
    /// Delegated scopes
    pub scp: Option<String>,
    /// Application roles
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenClaims {
    /// Who the token belongs to
    pub fn identity(&self) -> &str {
        self.upn
            .as_deref()
            .or(self.appid.as_deref())
            .unwrap_or("unknown")
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Whether the token has already expired
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| at <= Utc::now())
    }
}

/// Get Graph authentication
///
/// Priority:
/// 1. Azure CLI (`az account get-access-token --resource-type ms-graph`)
/// 2. `GRAPH_TOKEN` environment variable
/// 3. `AZURE_ACCESS_TOKEN` environment variable
pub async fn get_graph_auth() -> Result<GraphAuthConfig> {
    if let Some(token) = get_az_cli_token().await {
        return Ok(GraphAuthConfig {
            token,
            source: AuthSource::Cli,
        });
    }

    for var in ["GRAPH_TOKEN", "AZURE_ACCESS_TOKEN"] {
        if let Ok(token) = env::var(var) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                return Ok(GraphAuthConfig {
                    token,
                    source: AuthSource::EnvVar,
                });
            }
        }
    }

    Err(Error::Auth(
        "No Graph authentication found. Run `az login` or set GRAPH_TOKEN".to_string(),
    ))
}

async fn get_az_cli_token() -> Option<String> {
    let output = Command::new("az")
        .args([
            "account",
            "get-access-token",
            "--resource-type",
            "ms-graph",
            "--query",
            "accessToken",
            "--output",
            "tsv",
        ])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Decode the claims of a JWT without verifying its signature
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::Auth("token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Auth(format!("token payload is not base64url: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Deserialize)]
struct Organizations {
    #[serde(default)]
    value: Vec<Organization>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    display_name: Option<String>,
}

/// Test Graph authentication
///
/// Returns the tenant's display name.
pub async fn test_graph_auth(config: &GraphAuthConfig, base_url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client
        .get(format!("{}/organization", base_url.trim_end_matches('/')))
        .bearer_auth(&config.token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Auth(format!(
            "Invalid token: Graph returned {}",
            response.status()
        )));
    }

    let orgs: Organizations = response.json().await?;
    Ok(orgs
        .value
        .into_iter()
        .find_map(|o| o.display_name)
        .unwrap_or_else(|| "unnamed tenant".to_string()))
}
