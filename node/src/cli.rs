//! # CLI Interface
//!
//! Command-line arguments for `anchor-node`, via `clap` derive. Every `run`
//! flag can also come from an `ANCHOR_*` environment variable.

use anchor_core::config::{
    OtpConfig, ServiceConfig, DEFAULT_API_PORT, DEFAULT_METRICS_PORT, DEFAULT_OTP_EXPIRY_SECONDS,
    DEFAULT_OTP_MAX_ATTEMPTS,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;

/// Anchor trust service node.
///
/// Serves OTP contact verification, DID registration, proof-of-control
/// challenges and encrypted backups over HTTP, with Prometheus metrics on
/// a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "anchor-node",
    about = "Anchor DID trust establishment service",
    version,
    propagate_version = true
)]
pub struct AnchorNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the service.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Directory for the identity database. Created on first run.
    #[arg(long, short = 'd', env = "ANCHOR_DATA_DIR", default_value = "./anchor-data")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "ANCHOR_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ANCHOR_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Lifetime of an OTP, and of the rate-limit window, in seconds.
    #[arg(long, env = "ANCHOR_OTP_EXPIRY_SECONDS", default_value_t = DEFAULT_OTP_EXPIRY_SECONDS)]
    pub otp_expiry_seconds: u64,

    /// OTPs an identifier may request per window.
    #[arg(long, env = "ANCHOR_OTP_MAX_ATTEMPTS", default_value_t = DEFAULT_OTP_MAX_ATTEMPTS)]
    pub otp_max_attempts: u32,

    /// Hex-encoded HMAC key for OTP digests.
    ///
    /// Nodes sharing an ephemeral store must share it. When omitted a random
    /// pepper is generated, which is fine for a single node: codes
    /// outstanding at restart simply stop validating.
    #[arg(long, env = "ANCHOR_OTP_PEPPER", hide_env_values = true)]
    pub otp_pepper: Option<String>,

    /// Upper bound on one ephemeral-store or registry call, in milliseconds.
    #[arg(long, env = "ANCHOR_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,

    /// Upper bound on one OTP delivery, in milliseconds.
    #[arg(long, env = "ANCHOR_NOTIFIER_TIMEOUT_MS", default_value_t = 5000)]
    pub notifier_timeout_ms: u64,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "ANCHOR_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "ANCHOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl RunArgs {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_str_lossy(&self.log_format)
    }

    /// OTP settings. Fails only on a pepper that isn't hex.
    pub fn otp_config(&self) -> Result<OtpConfig, hex::FromHexError> {
        let mut config = OtpConfig {
            expiry_seconds: self.otp_expiry_seconds,
            max_attempts: self.otp_max_attempts,
            ..OtpConfig::default()
        };
        if let Some(pepper) = &self.otp_pepper {
            config.pepper = hex::decode(pepper.trim())?;
        }
        Ok(config)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            notifier_timeout: Duration::from_millis(self.notifier_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        AnchorNodeCli::command().debug_assert();
    }

    fn parse_run(args: &[&str]) -> RunArgs {
        let mut argv = vec!["anchor-node", "run"];
        argv.extend_from_slice(args);
        match AnchorNodeCli::parse_from(argv).command {
            Commands::Run(run) => run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_run_defaults() {
        let run = parse_run(&[]);
        assert_eq!(run.api_port, DEFAULT_API_PORT);
        assert_eq!(run.metrics_port, DEFAULT_METRICS_PORT);

        let otp = run.otp_config().unwrap();
        assert_eq!(otp.expiry_seconds, 180);
        assert_eq!(otp.max_attempts, 3);
        assert_eq!(otp.pepper.len(), 32);
        assert_eq!(run.service_config().store_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_pepper_from_hex() {
        let run = parse_run(&["--otp-pepper", "00ff10"]);
        assert_eq!(run.otp_config().unwrap().pepper, vec![0x00, 0xff, 0x10]);

        let bad = parse_run(&["--otp-pepper", "not-hex"]);
        assert!(bad.otp_config().is_err());
    }

    #[test]
    fn test_log_format_flag() {
        assert_eq!(parse_run(&["--log-format", "JSON"]).log_format(), LogFormat::Json);
        assert_eq!(parse_run(&[]).log_format(), LogFormat::Pretty);
    }
}
