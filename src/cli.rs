//! Command-line interface definitions for `sonar`.
//!
//! Configuration layers, lowest precedence first: defaults, `.sonar.toml`,
//! `SONAR_*` environment variables, then command-line flags.

#![expect(
    non_snake_case,
    reason = "Clap/OrthoConfig derive macros generate helper modules with uppercase names"
)]
#![allow(
    missing_docs,
    reason = "OrthoConfig and Clap derive macros generate items that cannot be documented"
)]
#![allow(
    unfulfilled_lint_expectations,
    reason = "derive macros conditionally generate items"
)]

use clap::{Args, Parser, Subcommand};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::protocol::{CLIENT_ID, DEFAULT_CLIENT_VERSION, DEFAULT_TIMEOUT};

/// Arguments for the `verify` subcommand.
#[expect(
    missing_docs,
    reason = "OrthoConfig derive macro generates items that cannot be documented"
)]
#[derive(Parser, OrthoConfig, Deserialize, Serialize, Default, Debug, Clone)]
#[ortho_config(prefix = "SONAR_")]
pub struct VerifyArgs {
    /// Base URL of the server, e.g. `https://music.example.com`.
    pub url: Option<String>,
    /// Account username.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Accept self-signed TLS certificates.
    #[arg(long)]
    #[serde(default)]
    pub allow_self_signed: bool,
    /// The account is backed by LDAP; send the password instead of a token.
    #[arg(long)]
    #[serde(default)]
    pub ldap: bool,
}

/// CLI subcommands exposed by `sonar`.
#[derive(Subcommand, Deserialize, Serialize, Debug, Clone)]
pub enum Commands {
    /// Check connectivity, credentials and licence of a server.
    #[command(name = "verify")]
    Verify(VerifyArgs),
}

/// Client configuration shared by every subcommand.
#[expect(
    missing_docs,
    reason = "OrthoConfig derive macro generates items that cannot be documented"
)]
#[derive(Args, OrthoConfig, Serialize, Deserialize, Default, Debug, Clone)]
#[ortho_config(prefix = "SONAR_")]
pub struct AppConfig {
    /// Highest protocol version the client presents.
    #[ortho_config(default = DEFAULT_CLIENT_VERSION.to_string())]
    #[arg(long, default_value_t = DEFAULT_CLIENT_VERSION.to_string())]
    pub client_version: String,
    /// Client identifier sent with every request.
    #[ortho_config(default = CLIENT_ID.to_owned())]
    #[arg(long, default_value_t = String::from(CLIENT_ID))]
    pub client_id: String,
    /// Per-request timeout in seconds.
    #[ortho_config(default = DEFAULT_TIMEOUT.as_secs())]
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,
}

/// Top-level CLI entry point consumed by the binary.
#[derive(Parser, Deserialize, Serialize, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Client configuration.
    #[command(flatten)]
    pub config: AppConfig,
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_apply() {
        Jail::expect_with(|_j| {
            let cfg = AppConfig::load_from_iter(["sonar"]).expect("load");
            assert_eq!(cfg.client_version, "1.16.1");
            assert_eq!(cfg.client_id, "sonar");
            assert_eq!(cfg.timeout_secs, 30);
            Ok(())
        });
    }

    #[rstest]
    fn env_config_loading() {
        Jail::expect_with(|j| {
            j.set_env("SONAR_CLIENT_VERSION", "1.12.0");
            j.set_env("SONAR_TIMEOUT_SECS", "5");
            let cfg = AppConfig::load_from_iter(["sonar"]).expect("load");
            assert_eq!(cfg.client_version, "1.12.0");
            assert_eq!(cfg.timeout_secs, 5);
            Ok(())
        });
    }

    #[rstest]
    fn cli_overrides_env() {
        Jail::expect_with(|j| {
            j.set_env("SONAR_CLIENT_ID", "from-env");
            let cfg = AppConfig::load_from_iter(["sonar", "--client-id", "from-cli"])
                .expect("load");
            assert_eq!(cfg.client_id, "from-cli");
            Ok(())
        });
    }

    #[rstest]
    fn loads_from_dotfile() {
        Jail::expect_with(|j| {
            j.create_file(".sonar.toml", "client_version = \"1.15.0\"")?;
            let cfg = AppConfig::load_from_iter(["sonar"]).expect("load");
            assert_eq!(cfg.client_version, "1.15.0");
            Ok(())
        });
    }

    #[rstest]
    fn parses_verify_subcommand() {
        let cli = Cli::try_parse_from([
            "sonar",
            "--timeout-secs",
            "10",
            "verify",
            "https://music.example.com",
            "alice",
            "secret",
            "--ldap",
        ])
        .expect("parse");

        assert_eq!(cli.config.timeout_secs, 10);
        let Some(Commands::Verify(args)) = cli.command else {
            panic!("expected verify subcommand");
        };
        assert_eq!(args.url.as_deref(), Some("https://music.example.com"));
        assert_eq!(args.username.as_deref(), Some("alice"));
        assert_eq!(args.password.as_deref(), Some("secret"));
        assert!(args.ldap);
        assert!(!args.allow_self_signed);
    }
}
