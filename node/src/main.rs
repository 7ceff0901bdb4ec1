// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Anchor Node
//!
//! Entry point for the `anchor-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the trust services together and
//! serves the HTTP API.
//!
//! The binary supports two subcommands:
//!
//! - `run`: start the service
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use anchor_core::backup::BackupService;
use anchor_core::identity::IdentityService;
use anchor_core::notify::LogNotifier;
use anchor_core::otp::OtpManager;
use anchor_core::proof::ProofAuthenticator;
use anchor_core::storage::IdentityDb;
use anchor_core::store::MemoryStore;

use cli::{AnchorNodeCli, Commands};
use metrics::NodeMetrics;

/// How often expired OTPs, counters and challenges are swept from memory.
/// Reads already ignore expired entries; this only bounds memory.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AnchorNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the service: API server, metrics endpoint and the store sweeper.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log_level, args.log_format());

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting anchor-node"
    );

    anchor_core::crypto::init()
        .map_err(|e| anyhow::anyhow!("crypto self-test failed: {e}"))?;

    let otp_config = args
        .otp_config()
        .context("ANCHOR_OTP_PEPPER must be hex")?;
    if args.otp_pepper.is_none() {
        tracing::warn!("no OTP pepper configured, using a random one for this process");
    }
    let limits = args.service_config();

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = IdentityDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(
        path = %db_path.display(),
        identities = db.identity_count(),
        "database opened"
    );

    // --- Services ---
    let store = Arc::new(MemoryStore::new());
    let otp = Arc::new(OtpManager::new(
        store.clone(),
        Arc::new(LogNotifier),
        otp_config,
        limits,
    ));
    let proof = Arc::new(ProofAuthenticator::new(
        store.clone(),
        Arc::new(db.clone()),
        limits,
    ));
    let identity = Arc::new(IdentityService::new(Arc::new(db.clone()), otp.clone()));
    let backup = Arc::new(BackupService::new(Arc::new(db.clone())));

    // --- Metrics ---
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to register prometheus metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: anchor_core::config::SERVICE_VERSION.to_string(),
        otp,
        proof,
        identity,
        backup,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Store sweeper ---
    let sweep_store = Arc::clone(&store);
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sweep_store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, live = sweep_store.len(), "expired entries purged");
            }
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    sweeper.abort();
    db.flush().context("failed to flush database")?;
    tracing::info!("anchor-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("anchor-node {}", env!("CARGO_PKG_VERSION"));
    println!("service     {}", anchor_core::config::SERVICE_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler can't be
/// installed that branch never fires and the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
