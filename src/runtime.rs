//! Command dispatch for the `sonar` binary.
//!
//! The binary stays a thin wrapper around [`run`]; everything it does is
//! reachable from the library so tests can drive it with a parsed [`Cli`].

#![allow(
    clippy::print_stdout,
    reason = "intentional user output for CLI commands"
)]

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use ortho_config::load_and_merge_subcommand_for;
use tracing::debug;

use crate::{
    api::{ClientSettings, HttpConnector},
    cli::{AppConfig, Cli, Commands, VerifyArgs},
    profile::ServerProfile,
    protocol::client_version_from_config,
    verifier::{ConnectivityVerifier, VerificationReport},
};

/// Parse CLI arguments and execute the requested command.
///
/// # Errors
///
/// Returns any error emitted while parsing configuration or running the
/// command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli).await
}

/// Execute an already parsed [`Cli`].
///
/// # Errors
///
/// Propagates failures from [`run_command`], or reports a missing
/// subcommand.
pub async fn run_with_cli(cli: Cli) -> Result<()> {
    let Cli { config, command } = cli;
    match command {
        Some(command) => run_command(command, &config).await,
        None => bail!("no command given; try `sonar verify --help`"),
    }
}

/// Execute a single subcommand.
///
/// # Errors
///
/// Propagates failures from configuration merging, profile validation, or a
/// verification run that did not succeed.
pub async fn run_command(command: Commands, cfg: &AppConfig) -> Result<()> {
    match command {
        Commands::Verify(args) => {
            let args = load_and_merge_subcommand_for::<VerifyArgs>(&args)?;
            run_verify(args, cfg).await
        }
    }
}

/// Build an HTTP-backed verifier from client configuration.
///
/// # Errors
///
/// Returns an error if the configured client version is malformed or older
/// than every known version.
pub fn verifier_from_config(cfg: &AppConfig) -> Result<ConnectivityVerifier> {
    let client_max = client_version_from_config(&cfg.client_version)
        .with_context(|| format!("invalid client_version {:?}", cfg.client_version))?;
    let connector = HttpConnector::new(ClientSettings {
        client_id: cfg.client_id.clone(),
        timeout: Duration::from_secs(cfg.timeout_secs),
    });
    debug!(%client_max, client_id = %cfg.client_id, "verifier configured");
    Ok(ConnectivityVerifier::new(connector, client_max))
}

fn profile_from_args(args: VerifyArgs) -> Result<ServerProfile> {
    let url = args.url.ok_or_else(|| anyhow!("missing server url"))?;
    let username = args.username.ok_or_else(|| anyhow!("missing username"))?;
    let password = args.password.ok_or_else(|| anyhow!("missing password"))?;
    let profile = ServerProfile::new(&url, username, password)
        .with_context(|| format!("invalid server profile for {url}"))?;
    Ok(profile
        .with_self_signed_certificate(args.allow_self_signed)
        .with_ldap_support(args.ldap))
}

async fn run_verify(args: VerifyArgs, cfg: &AppConfig) -> Result<()> {
    let profile = profile_from_args(args)?;
    let verifier = verifier_from_config(cfg)?;
    let report = verifier.verify(&profile).await;
    print_report(&report);
    if report.outcome.is_success() {
        Ok(())
    } else {
        Err(anyhow!(report.outcome.message()))
    }
}

fn print_report(report: &VerificationReport) {
    println!("{}", report.outcome);
    if let Some(version) = report.discovered_version {
        println!("Server API version: {version}");
    }
}
