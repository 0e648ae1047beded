//! Batch job: expire stale quotations and flag overdue invoices.
//!
//! Prints a JSON summary on stdout. Per-document failures are reported in the
//! summary; only configuration, connection or candidate-query failures exit 1.

use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::process::ExitCode;
use workshop_billing_service::config::WorkshopConfig;
use workshop_billing_service::services::{
    init_metrics, refresh_overdue_invoices, run_expiration_sweep, SweepReport,
};
use workshop_billing_service::startup::connect_repository;

#[derive(Serialize)]
struct Summary {
    quotations: SweepReport,
    invoices: SweepReport,
}

async fn run() -> Result<Summary, AppError> {
    let config = WorkshopConfig::from_env()?;
    init_tracing(
        "workshop-billing-sweep",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    init_metrics();

    let repo = connect_repository(&config, false).await?;
    let now = Utc::now();

    tracing::info!(now = %now, "Starting expiration sweep");

    let quotations = run_expiration_sweep(repo.as_ref(), now).await?;
    let invoices = refresh_overdue_invoices(repo.as_ref(), now).await?;

    for error in quotations.errors.iter().chain(invoices.errors.iter()) {
        tracing::error!(error = %error, "Document could not be transitioned");
    }

    Ok(Summary {
        quotations,
        invoices,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render sweep summary: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Expiration sweep failed");
            eprintln!("Expiration sweep failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
