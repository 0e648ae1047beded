//! Storage seam for quotations and invoices.

use crate::models::{
    Invoice, InvoiceFilter, Page, Pagination, Quotation, QuotationFilter, ServiceRecord,
    ServiceRequest, StatusTally,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// A document number already exists in storage.
///
/// Carried inside `AppError::Conflict` so creation paths can tell a numbering
/// collision apart from other conflicts and retry with a fresh number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Document number {0} already exists")]
pub struct DuplicateNumber(pub String);

/// The stored copy changed since it was read. Carried inside `AppError::Conflict`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Document {id} was modified concurrently (expected version {expected})")]
pub struct StaleVersion {
    pub id: Uuid,
    pub expected: i64,
}

pub fn is_duplicate_number(err: &AppError) -> bool {
    matches!(err, AppError::Conflict(e) if e.is::<DuplicateNumber>())
}

pub fn is_stale_version(err: &AppError) -> bool {
    matches!(err, AppError::Conflict(e) if e.is::<StaleVersion>())
}

/// Persistence operations needed by the quotation and invoice services.
///
/// `save_*` is a compare-and-swap on `version`: it fails with a [`StaleVersion`]
/// conflict when the stored version differs from the one carried by the
/// document, and returns the stored copy with the bumped version otherwise.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get_service_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, AppError>;

    async fn get_service_record(&self, id: Uuid) -> Result<Option<ServiceRecord>, AppError>;

    // Quotations

    async fn insert_quotation(&self, quotation: &Quotation) -> Result<(), AppError>;

    async fn get_quotation(&self, id: Uuid) -> Result<Option<Quotation>, AppError>;

    async fn save_quotation(&self, quotation: &Quotation) -> Result<Quotation, AppError>;

    async fn list_quotations(
        &self,
        filter: &QuotationFilter,
        pagination: Pagination,
        now: DateTime<Utc>,
    ) -> Result<Page<Quotation>, AppError>;

    /// Open quotations whose validity ended before `now`.
    async fn find_expirable_quotations(&self, now: DateTime<Utc>) -> Result<Vec<Quotation>, AppError>;

    /// Conditionally mark a quotation expired. `false` if it was no longer open.
    async fn expire_quotation(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// One tally per effective status at `now`.
    async fn quotation_stats(
        &self,
        filter: &QuotationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTally>, AppError>;

    // Invoices

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError>;

    async fn save_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError>;

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        pagination: Pagination,
        now: DateTime<Utc>,
    ) -> Result<Page<Invoice>, AppError>;

    async fn find_invoice_by_quotation(&self, quotation_id: Uuid) -> Result<Option<Invoice>, AppError>;

    /// Unpaid pending invoices whose due date passed before `now`.
    async fn find_overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, AppError>;

    /// Conditionally mark a pending invoice overdue. `false` if it no longer qualifies.
    async fn mark_invoice_overdue(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// One tally per effective payment status at `now`.
    async fn invoice_stats(
        &self,
        filter: &InvoiceFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTally>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
