//! Hotspot Billing Server
//!
//! HTTP purchase API plus operator subcommands for credential import, claim
//! audit, orphan release, commission reconciliation, and payouts.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use hotspot_billing::storage::{CLAIM_GRACE_SECS, NewCredential};
use hotspot_billing::{BillingDatabase, CommissionAccrual, PurchaseError, PurchaseService};
use hotspot_core::Config;
use hotspot_core::config::load_config;
use hotspot_core::tracing_init::{default_filter, init_tracing};
use hotspot_server::routes::{AppState, build_admin_router, build_router};

#[derive(Parser, Debug)]
#[command(name = "hotspot-server")]
#[command(version, about = "Hotspot billing server - purchase API and operator tools")]
struct Args {
    /// Path to SQLite database file.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Address for the public purchase API.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Address for the funding and import API.
        #[arg(long)]
        admin_addr: Option<SocketAddr>,

        /// Commission rate in basis points.
        #[arg(long)]
        commission_bps: Option<u32>,

        /// OTLP collector endpoint for metrics.
        #[cfg(feature = "metrics")]
        #[arg(long, env = "HOTSPOT_OTLP_ENDPOINT", default_value = "http://localhost:4317")]
        otlp_endpoint: String,
    },

    /// Import credentials from a JSON file of `{"username", "password"}` objects.
    Import {
        #[arg(long)]
        location: String,
        #[arg(long)]
        plan: String,
        file: PathBuf,
    },

    /// Check claimed credentials against purchases. Fails if anything is inconsistent.
    Audit,

    /// Free a claimed credential that no purchase references once its claim
    /// is past the grace period.
    ReleaseOrphan { credential_id: String },

    /// Accrue commission for purchases that missed it.
    Reconcile {
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Mark a referrer's outstanding earnings as paid.
    Payout { referrer_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cwd = std::env::current_dir().ok();
    let mut config = load_config(cwd.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &args.db_path {
        config.server.database_path = Some(path.clone());
    }
    if args.log_json {
        config.server.log_json = true;
    }

    init_tracing(
        &default_filter(&config.server.log_level),
        config.server.log_json,
    );

    let db = open_database(&config).await?;

    match args.command {
        Command::Serve {
            addr,
            admin_addr,
            commission_bps,
            #[cfg(feature = "metrics")]
            otlp_endpoint,
        } => {
            if let Some(addr) = addr {
                config.server.listen_addr = addr;
            }
            if let Some(addr) = admin_addr {
                config.server.admin_listen_addr = addr;
            }
            if let Some(bps) = commission_bps {
                config.commission.rate_bps = bps;
            }

            #[cfg(feature = "metrics")]
            let metrics = hotspot_core::metrics::init_metrics("hotspot-server", &otlp_endpoint)?;

            serve(db, &config).await?;

            #[cfg(feature = "metrics")]
            metrics.shutdown()?;
            Ok(())
        }
        Command::Import {
            location,
            plan,
            file,
        } => import(&db, &location, &plan, &file).await,
        Command::Audit => audit(db, config.commission.rate_bps).await,
        Command::ReleaseOrphan { credential_id } => {
            if db.release_orphaned_claim(&credential_id).await? {
                info!(credential_id = %credential_id, "Claim released");
                Ok(())
            } else {
                anyhow::bail!(
                    "Credential {credential_id} is not an orphaned claim older than {CLAIM_GRACE_SECS}s"
                )
            }
        }
        Command::Reconcile { limit } => {
            let accrual = CommissionAccrual::new(db, config.commission.rate_bps);
            let report = accrual
                .reconcile(limit.unwrap_or(config.commission.reconcile_batch))
                .await?;
            info!(
                examined = report.examined,
                accrued = report.accrued,
                failed = report.failed,
                "Reconciliation finished"
            );
            Ok(())
        }
        Command::Payout { referrer_id } => {
            let accrual = CommissionAccrual::new(db, config.commission.rate_bps);
            let paid = accrual.mark_paid(&referrer_id).await?;
            info!(referrer_id = %referrer_id, earnings = paid, "Payout recorded");
            Ok(())
        }
    }
}

async fn open_database(config: &Config) -> anyhow::Result<BillingDatabase> {
    let path = match &config.server.database_path {
        Some(path) => path.clone(),
        None => hotspot_core::config::database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine default database path"))?,
    };
    info!(path = %path.display(), "Opening billing database");
    Ok(BillingDatabase::open(&path).await?)
}

async fn serve(db: BillingDatabase, config: &Config) -> anyhow::Result<()> {
    let addr = config.server.listen_addr;
    let admin_addr = config.server.admin_listen_addr;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        admin_addr = %admin_addr,
        commission_bps = config.commission.rate_bps,
        "Starting hotspot-server"
    );

    let state = AppState::new(db, config.commission.rate_bps);

    // Background pass for commission the inline accrual missed.
    let accrual = state.service.commission().clone();
    let interval_secs = config.commission.reconcile_interval_secs.max(1);
    let batch = config.commission.reconcile_batch;
    let reconciler = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            if let Err(e) = accrual.reconcile(batch).await {
                warn!(error = %e, "Background commission reconciliation failed");
            }
        }
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        let _ = stop_tx.send(true);
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;
    let public = axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(stopped(stop_rx.clone()))
        .into_future();
    let admin = axum::serve(admin_listener, build_admin_router(state))
        .with_graceful_shutdown(stopped(stop_rx))
        .into_future();
    tokio::try_join!(public, admin)?;

    reconciler.abort();
    info!("Server stopped");
    Ok(())
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

async fn import(db: &BillingDatabase, location: &str, plan: &str, file: &Path) -> anyhow::Result<()> {
    if db.get_location(location).await?.is_none() {
        anyhow::bail!("Unknown location {location}");
    }
    if db.get_plan(plan).await?.is_none() {
        anyhow::bail!("Unknown plan {plan}");
    }

    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let credentials: Vec<NewCredential> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let report = db.import_credentials(location, plan, &credentials).await?;
    info!(
        location_id = location,
        plan_id = plan,
        inserted = report.inserted,
        rejected = report.rejected.len(),
        "Credentials imported"
    );
    for username in &report.rejected {
        warn!(username = %username, "Credential rejected");
    }
    Ok(())
}

async fn audit(db: BillingDatabase, rate_bps: u32) -> anyhow::Result<()> {
    let service = PurchaseService::new(db.clone(), rate_bps);
    match service.verify_claims().await {
        Ok(_) => {
            info!("Claim audit clean");
            Ok(())
        }
        Err(PurchaseError::InternalInconsistency(summary)) => {
            let report = db.audit_claims().await?;
            for credential_id in &report.orphaned_claims {
                warn!(credential_id = %credential_id, "Claimed credential has no purchase");
            }
            for purchase_id in &report.unbacked_purchases {
                warn!(purchase_id = %purchase_id, "Purchase credential not claimed by purchaser");
            }
            anyhow::bail!("Claim audit failed: {summary}")
        }
        Err(e) => Err(e.into()),
    }
}
