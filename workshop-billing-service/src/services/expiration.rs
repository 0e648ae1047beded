//! Batch sweeps: expire stale quotations and flag overdue invoices.
//!
//! Each document is transitioned independently; a failure is recorded in the
//! report and the sweep moves on. Only a failure to list candidates aborts.

use super::metrics::SWEEP_DOCUMENTS_TOTAL;
use super::repository::DocumentRepository;
use crate::models::DocumentKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Documents transitioned by this run.
    pub processed: usize,
    /// Candidates another writer transitioned first.
    pub skipped: usize,
    /// One `"<kind> <id>: <reason>"` entry per failed document.
    pub errors: Vec<String>,
}

impl SweepReport {
    fn record(&mut self, kind: DocumentKind, id: Uuid, outcome: Result<bool, AppError>) {
        let label = match outcome {
            Ok(true) => {
                self.processed += 1;
                "processed"
            }
            Ok(false) => {
                self.skipped += 1;
                "skipped"
            }
            Err(e) => {
                warn!(kind = kind.as_str(), id = %id, error = %e, "Sweep failed for document");
                self.errors.push(format!("{} {}: {}", kind.as_str(), id, e));
                "error"
            }
        };
        SWEEP_DOCUMENTS_TOTAL
            .with_label_values(&[kind.as_str(), label])
            .inc();
    }
}

/// Move every open quotation whose validity ended before `now` to expired.
#[instrument(skip(repo))]
pub async fn run_expiration_sweep(
    repo: &dyn DocumentRepository,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    let candidates = repo.find_expirable_quotations(now).await?;
    let mut report = SweepReport::default();

    for quotation in candidates {
        let outcome = repo.expire_quotation(quotation.id, now).await;
        if matches!(outcome, Ok(true)) {
            info!(
                quotation_id = %quotation.id,
                quotation_number = %quotation.quotation_number(),
                valid_until = %quotation.valid_until(),
                "Quotation expired"
            );
        }
        report.record(DocumentKind::Quotation, quotation.id, outcome);
    }

    info!(
        processed = report.processed,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Quotation expiration sweep finished"
    );

    Ok(report)
}

/// Persist `overdue` on unpaid pending invoices past their due date.
#[instrument(skip(repo))]
pub async fn refresh_overdue_invoices(
    repo: &dyn DocumentRepository,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    let candidates = repo.find_overdue_candidates(now).await?;
    let mut report = SweepReport::default();

    for invoice in candidates {
        let outcome = repo.mark_invoice_overdue(invoice.id, now).await;
        if matches!(outcome, Ok(true)) {
            info!(
                invoice_id = %invoice.id,
                invoice_number = %invoice.invoice_number(),
                due_date = %invoice.due_date(),
                "Invoice marked overdue"
            );
        }
        report.record(DocumentKind::Invoice, invoice.id, outcome);
    }

    info!(
        processed = report.processed,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Overdue invoice sweep finished"
    );

    Ok(report)
}
