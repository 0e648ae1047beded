//! Process-local repository used by tests and database-less local runs.

use super::repository::{DocumentRepository, DuplicateNumber, StaleVersion};
use crate::models::{
    Invoice, InvoiceFilter, Page, Pagination, PaymentStatus, Quotation, QuotationFilter,
    ServiceRecord, ServiceRecordStatus, ServiceRequest, StatusTally,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    service_requests: HashMap<Uuid, ServiceRequest>,
    service_records: HashMap<Uuid, ServiceRecord>,
    quotations: HashMap<Uuid, Quotation>,
    invoices: HashMap<Uuid, Invoice>,
}

/// In-memory [`DocumentRepository`] with the same uniqueness and version rules
/// as the PostgreSQL schema.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_service_request(&self, request: ServiceRequest) {
        self.store
            .write()
            .await
            .service_requests
            .insert(request.id, request);
    }

    pub async fn insert_service_record(&self, record: ServiceRecord) {
        self.store
            .write()
            .await
            .service_records
            .insert(record.id, record);
    }

    pub async fn set_service_record_status(&self, id: Uuid, status: ServiceRecordStatus) {
        if let Some(record) = self.store.write().await.service_records.get_mut(&id) {
            record.status = status;
        }
    }
}

fn paginate<T>(mut items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as u64;
    let offset = pagination.offset() as usize;
    let limit = pagination.limit() as usize;
    let page_items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(limit).collect()
    };
    Page::new(page_items, pagination, total)
}

fn quotation_matches(q: &Quotation, filter: &QuotationFilter, now: DateTime<Utc>) -> bool {
    filter.store_id.map_or(true, |id| q.store_id == id)
        && filter.customer_id.map_or(true, |id| q.customer_id == id)
        && filter
            .service_request_id
            .map_or(true, |id| q.service_request_id == id)
        && filter
            .status
            .map_or(true, |status| q.effective_status(now) == status)
}

fn invoice_matches(inv: &Invoice, filter: &InvoiceFilter, now: DateTime<Utc>) -> bool {
    filter.store_id.map_or(true, |id| inv.store_id == id)
        && filter.customer_id.map_or(true, |id| inv.customer_id == id)
        && filter
            .service_record_id
            .map_or(true, |id| inv.service_record_id == id)
        && filter
            .payment_status
            .map_or(true, |status| inv.current_status(now) == status)
}

fn stale(id: Uuid, expected: i64) -> AppError {
    AppError::Conflict(anyhow::Error::new(StaleVersion { id, expected }))
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn get_service_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, AppError> {
        Ok(self.store.read().await.service_requests.get(&id).cloned())
    }

    async fn get_service_record(&self, id: Uuid) -> Result<Option<ServiceRecord>, AppError> {
        Ok(self.store.read().await.service_records.get(&id).cloned())
    }

    async fn insert_quotation(&self, quotation: &Quotation) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        if store
            .quotations
            .values()
            .any(|q| q.quotation_number() == quotation.quotation_number())
        {
            return Err(AppError::Conflict(anyhow::Error::new(DuplicateNumber(
                quotation.quotation_number().to_string(),
            ))));
        }
        store.quotations.insert(quotation.id, quotation.clone());
        Ok(())
    }

    async fn get_quotation(&self, id: Uuid) -> Result<Option<Quotation>, AppError> {
        Ok(self.store.read().await.quotations.get(&id).cloned())
    }

    async fn save_quotation(&self, quotation: &Quotation) -> Result<Quotation, AppError> {
        let mut store = self.store.write().await;
        let current = store.quotations.get_mut(&quotation.id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Quotation {} not found", quotation.id))
        })?;
        if current.version() != quotation.version() {
            return Err(stale(quotation.id, quotation.version()));
        }
        let mut saved = quotation.clone();
        saved.bump_version();
        *current = saved.clone();
        Ok(saved)
    }

    async fn list_quotations(
        &self,
        filter: &QuotationFilter,
        pagination: Pagination,
        now: DateTime<Utc>,
    ) -> Result<Page<Quotation>, AppError> {
        let store = self.store.read().await;
        let mut items: Vec<Quotation> = store
            .quotations
            .values()
            .filter(|q| quotation_matches(q, filter, now))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(items, pagination))
    }

    async fn find_expirable_quotations(&self, now: DateTime<Utc>) -> Result<Vec<Quotation>, AppError> {
        let store = self.store.read().await;
        let mut items: Vec<Quotation> = store
            .quotations
            .values()
            .filter(|q| q.status().is_open() && q.valid_until() < now)
            .cloned()
            .collect();
        items.sort_by_key(|q| q.valid_until());
        Ok(items)
    }

    async fn expire_quotation(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut store = self.store.write().await;
        let Some(quotation) = store.quotations.get_mut(&id) else {
            return Ok(false);
        };
        if quotation.expire(now) {
            quotation.bump_version();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn quotation_stats(
        &self,
        filter: &QuotationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTally>, AppError> {
        let store = self.store.read().await;
        let mut groups: BTreeMap<&'static str, StatusTally> = BTreeMap::new();
        for q in store
            .quotations
            .values()
            .filter(|q| quotation_matches(q, filter, now))
        {
            let status = q.effective_status(now).as_str();
            let tally = groups.entry(status).or_insert_with(|| StatusTally {
                status: status.to_string(),
                count: 0,
                amount: Decimal::ZERO,
                paid: Decimal::ZERO,
            });
            tally.count += 1;
            tally.amount += q.total();
        }
        Ok(groups.into_values().collect())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        if store
            .invoices
            .values()
            .any(|i| i.invoice_number() == invoice.invoice_number())
        {
            return Err(AppError::Conflict(anyhow::Error::new(DuplicateNumber(
                invoice.invoice_number().to_string(),
            ))));
        }
        if let Some(quotation_id) = invoice.quotation_id {
            if store
                .invoices
                .values()
                .any(|i| i.quotation_id == Some(quotation_id))
            {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Quotation {} has already been invoiced",
                    quotation_id
                )));
            }
        }
        store.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.store.read().await.invoices.get(&id).cloned())
    }

    async fn save_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError> {
        let mut store = self.store.write().await;
        let current = store.invoices.get_mut(&invoice.id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice.id))
        })?;
        if current.version() != invoice.version() {
            return Err(stale(invoice.id, invoice.version()));
        }
        let mut saved = invoice.clone();
        saved.bump_version();
        *current = saved.clone();
        Ok(saved)
    }

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        pagination: Pagination,
        now: DateTime<Utc>,
    ) -> Result<Page<Invoice>, AppError> {
        let store = self.store.read().await;
        let mut items: Vec<Invoice> = store
            .invoices
            .values()
            .filter(|i| invoice_matches(i, filter, now))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(items, pagination))
    }

    async fn find_invoice_by_quotation(&self, quotation_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .store
            .read()
            .await
            .invoices
            .values()
            .find(|i| i.quotation_id == Some(quotation_id))
            .cloned())
    }

    async fn find_overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, AppError> {
        let store = self.store.read().await;
        let mut items: Vec<Invoice> = store
            .invoices
            .values()
            .filter(|i| {
                i.payment_status() == PaymentStatus::Pending
                    && i.paid_amount() == Decimal::ZERO
                    && i.due_date() < now
            })
            .cloned()
            .collect();
        items.sort_by_key(|i| i.due_date());
        Ok(items)
    }

    async fn mark_invoice_overdue(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut store = self.store.write().await;
        let Some(invoice) = store.invoices.get_mut(&id) else {
            return Ok(false);
        };
        if invoice.payment_status() == PaymentStatus::Pending
            && invoice.current_status(now) == PaymentStatus::Overdue
        {
            invoice.refresh_status(now);
            invoice.bump_version();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn invoice_stats(
        &self,
        filter: &InvoiceFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTally>, AppError> {
        let store = self.store.read().await;
        let mut groups: BTreeMap<&'static str, StatusTally> = BTreeMap::new();
        for inv in store
            .invoices
            .values()
            .filter(|i| invoice_matches(i, filter, now))
        {
            let status = inv.current_status(now).as_str();
            let tally = groups.entry(status).or_insert_with(|| StatusTally {
                status: status.to_string(),
                count: 0,
                amount: Decimal::ZERO,
                paid: Decimal::ZERO,
            });
            tally.count += 1;
            tally.amount += inv.total();
            tally.paid += inv.paid_amount();
        }
        Ok(groups.into_values().collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
