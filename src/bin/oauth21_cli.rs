// ABOUTME: oauth21-cli - command-line companion for the DocAIche OAuth 2.1 subsystem
// ABOUTME: Generates PKCE pairs, lists resources, builds authorization URLs and validates tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche
//!
//! Usage:
//! ```bash
//! # Generate a PKCE pair
//! oauth21-cli pkce
//!
//! # Verify a verifier against a challenge
//! oauth21-cli pkce --verifier <verifier> --challenge <challenge>
//!
//! # List protected resources requiring the `read` scope
//! oauth21-cli resources --scope read
//!
//! # Build an authorization URL (configuration from OAUTH21_* variables)
//! oauth21-cli authorize-url --redirect-uri https://app.example/callback \
//!     --scope "read write" --resource urn:docaiche:tool:search
//!
//! # Validate an access token
//! oauth21-cli validate <token> --scope read --resource urn:docaiche:tool:search
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docaiche_auth::config::OAuth21Config;
use docaiche_auth::logging::LoggingConfig;
use docaiche_auth::oauth21::{
    pkce, FlowOptions, InMemoryTokenStore, OAuth21Handler, PkceChallenge, ResourceRegistry,
};
use docaiche_auth::security::TracingAuditor;
use serde_json::json;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "oauth21-cli",
    about = "DocAIche OAuth 2.1 CLI",
    long_about = "Inspect and exercise the DocAIche OAuth 2.1 authorization subsystem."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a PKCE pair, or verify one
    Pkce {
        /// Verifier to check
        #[arg(long, requires = "challenge")]
        verifier: Option<String>,

        /// Challenge the verifier must hash to
        #[arg(long, requires = "verifier")]
        challenge: Option<String>,
    },

    /// Show the provider capability description
    ProviderInfo,

    /// List protected resources
    Resources {
        /// Only resources requiring this scope
        #[arg(long)]
        scope: Option<String>,

        /// Show the registered ancestry of a resource URN
        #[arg(long, conflicts_with = "scope")]
        hierarchy: Option<String>,
    },

    /// Build an authorization URL with a fresh PKCE pair
    AuthorizeUrl {
        /// Redirect URI registered with the authorization server
        #[arg(long)]
        redirect_uri: String,

        /// Space-separated scope
        #[arg(long, default_value = "read")]
        scope: String,

        /// Resource indicator (repeatable)
        #[arg(long = "resource")]
        resources: Vec<String>,

        /// Explicit state value
        #[arg(long)]
        state: Option<String>,
    },

    /// Validate an access token
    Validate {
        /// The access token
        token: String,

        /// Scope the token must carry
        #[arg(long)]
        scope: Option<String>,

        /// Resource the token must be bound to (repeatable)
        #[arg(long = "resource")]
        resources: Vec<String>,
    },
}

fn build_handler() -> Result<OAuth21Handler> {
    let config = OAuth21Config::from_env().context("invalid OAUTH21_* configuration")?;
    OAuth21Handler::from_config(
        config,
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(TracingAuditor::new()),
    )
    .context("failed to build OAuth 2.1 handler")
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if cli.verbose {
        logging.level = "debug".into();
    }
    logging.init()?;
    info!("DocAIche OAuth 2.1 CLI");

    match cli.command {
        Command::Pkce {
            verifier: Some(verifier),
            challenge: Some(challenge),
        } => {
            let result = pkce::verify(&verifier, &challenge, "S256");
            print_json(&json!({ "valid": result.is_ok() }))?;
            if result.is_err() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Pkce { .. } => {
            let pair = PkceChallenge::generate();
            print_json(&json!({
                "code_verifier": pair.verifier,
                "code_challenge": pair.challenge,
                "code_challenge_method": pair.method,
            }))?;
        }
        Command::ProviderInfo => {
            let handler = build_handler()?;
            print_json(&serde_json::to_value(handler.get_provider_info())?)?;
        }
        Command::Resources { scope, hierarchy } => {
            let registry = ResourceRegistry::docaiche_defaults()?;
            let listed = match (scope, hierarchy) {
                (_, Some(urn)) => registry.get_resource_hierarchy(&urn)?,
                (Some(scope), None) => registry.get_resources_for_scope(&scope),
                (None, None) => registry.resources(),
            };
            print_json(&serde_json::to_value(listed)?)?;
        }
        Command::AuthorizeUrl {
            redirect_uri,
            scope,
            resources,
            state,
        } => {
            let handler = build_handler()?;
            let flow = handler
                .initiate_auth_flow(
                    &redirect_uri,
                    &scope,
                    &resources,
                    FlowOptions { state, nonce: None },
                )
                .await?;
            print_json(&json!({
                "authorization_url": flow.authorization_url,
                "state": flow.state,
                "code_verifier": flow.pkce.verifier,
            }))?;
        }
        Command::Validate {
            token,
            scope,
            resources,
        } => {
            let handler = build_handler()?;
            match handler.check_token(&token, scope.as_deref(), &resources).await {
                Ok(claims) => print_json(&json!({ "valid": true, "claims": claims }))?,
                Err(e) => {
                    print_json(&json!({
                        "valid": false,
                        "error": e.code,
                        "message": e.public_message(),
                    }))?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
