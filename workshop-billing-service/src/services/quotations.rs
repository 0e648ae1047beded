//! Quotation use cases: authorization, persistence and retries around the
//! quotation state machine.

use super::clock::Clock;
use super::metrics::QUOTATION_TRANSITIONS_TOTAL;
use super::repository::{is_duplicate_number, is_stale_version, DocumentRepository};
use crate::config::BillingConfig;
use crate::models::{
    generate_number, Actor, Capability, DocumentKind, LineItemChanges, NewLineItem,
    NewQuotation, Page, Pagination, Quotation, QuotationFilter, QuotationStats,
    QuotationStatus, QuotationTerms,
};
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts at a read-modify-write before a version conflict is surfaced.
pub const MAX_SAVE_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct QuotationService {
    repo: Arc<dyn DocumentRepository>,
    clock: Arc<dyn Clock>,
    billing: BillingConfig,
}

impl QuotationService {
    pub fn new(repo: Arc<dyn DocumentRepository>, clock: Arc<dyn Clock>, billing: BillingConfig) -> Self {
        Self {
            repo,
            clock,
            billing,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn expiring_soon_days(&self) -> i64 {
        self.billing.expiring_soon_days
    }

    #[instrument(skip(self, actor, input), fields(actor_id = %actor.actor_id, service_request_id = %input.service_request_id))]
    pub async fn create(&self, actor: &Actor, input: NewQuotation) -> Result<Quotation, AppError> {
        let request = self
            .repo
            .get_service_request(input.service_request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Service request {} not found",
                    input.service_request_id
                ))
            })?;
        actor.require(request.store_id, Capability::CreateQuotations)?;

        let now = self.clock.now();
        let mut quotation = Quotation::draft(
            input,
            &request,
            actor.actor_id,
            generate_number(DocumentKind::Quotation, now),
            now,
        )?;

        let mut attempt = 1;
        loop {
            match self.repo.insert_quotation(&quotation).await {
                Ok(()) => break,
                Err(e) if is_duplicate_number(&e) && attempt < self.billing.max_number_retries => {
                    warn!(
                        quotation_number = %quotation.quotation_number(),
                        attempt = attempt,
                        "Quotation number collision, regenerating"
                    );
                    attempt += 1;
                    quotation.renumber(generate_number(DocumentKind::Quotation, self.clock.now()));
                }
                Err(e) => return Err(e),
            }
        }

        QUOTATION_TRANSITIONS_TOTAL
            .with_label_values(&[QuotationStatus::Draft.as_str()])
            .inc();
        info!(
            quotation_id = %quotation.id,
            quotation_number = %quotation.quotation_number(),
            total = %quotation.total(),
            "Quotation created"
        );

        Ok(quotation)
    }

    /// Fetch a quotation, persisting a lazily detected expiry on the way.
    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Quotation, AppError> {
        let mut quotation = self.load(id).await?;
        actor.require_view(quotation.store_id, quotation.customer_id)?;

        let now = self.clock.now();
        if quotation.effective_status(now) == QuotationStatus::Expired
            && quotation.status() != QuotationStatus::Expired
        {
            match self.repo.expire_quotation(id, now).await {
                Ok(true) => {
                    quotation.expire(now);
                    quotation.bump_version();
                    QUOTATION_TRANSITIONS_TOTAL
                        .with_label_values(&[QuotationStatus::Expired.as_str()])
                        .inc();
                    info!(quotation_id = %id, "Quotation expired on read");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(quotation_id = %id, error = %e, "Failed to persist quotation expiry");
                }
            }
        }

        Ok(quotation)
    }

    #[instrument(skip(self, actor, filter), fields(actor_id = %actor.actor_id))]
    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: QuotationFilter,
        pagination: Pagination,
    ) -> Result<Page<Quotation>, AppError> {
        scope_to_actor(actor, filter.store_id, &mut filter.customer_id)?;
        self.repo
            .list_quotations(&filter, pagination, self.clock.now())
            .await
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn stats(&self, actor: &Actor, store_id: Option<Uuid>) -> Result<QuotationStats, AppError> {
        actor.require_financials(store_id)?;
        let filter = QuotationFilter {
            store_id,
            ..Default::default()
        };
        let tallies = self.repo.quotation_stats(&filter, self.clock.now()).await?;
        Ok(QuotationStats::from_tallies(&tallies))
    }

    pub async fn send(&self, actor: &Actor, id: Uuid) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                actor.require(q.store_id, Capability::CreateQuotations)?;
                q.send(now)
            })
            .await?;
        self.record_transition(&quotation, "Quotation sent");
        Ok(quotation)
    }

    /// Customer acceptance. Only the customer of the underlying request may approve.
    pub async fn approve(&self, actor: &Actor, id: Uuid) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                require_customer(actor, q)?;
                q.approve(now)
            })
            .await?;
        self.record_transition(&quotation, "Quotation approved");
        Ok(quotation)
    }

    pub async fn reject(&self, actor: &Actor, id: Uuid) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                require_customer(actor, q)?;
                q.reject(now)
            })
            .await?;
        self.record_transition(&quotation, "Quotation rejected");
        Ok(quotation)
    }

    pub async fn revise(&self, actor: &Actor, id: Uuid) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                actor.require(q.store_id, Capability::CreateQuotations)?;
                q.revise(now)
            })
            .await?;
        self.record_transition(&quotation, "Quotation reopened for revision");
        Ok(quotation)
    }

    pub async fn add_line_item(
        &self,
        actor: &Actor,
        id: Uuid,
        item: NewLineItem,
    ) -> Result<(Quotation, Uuid), AppError> {
        self.update(id, |q, now| {
            actor.require(q.store_id, Capability::CreateQuotations)?;
            q.add_line_item(item.clone(), now)
        })
        .await
    }

    pub async fn update_line_item(
        &self,
        actor: &Actor,
        id: Uuid,
        item_id: Uuid,
        changes: LineItemChanges,
    ) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                actor.require(q.store_id, Capability::CreateQuotations)?;
                q.update_line_item(item_id, changes.clone(), now)
            })
            .await?;
        Ok(quotation)
    }

    pub async fn remove_line_item(
        &self,
        actor: &Actor,
        id: Uuid,
        item_id: Uuid,
    ) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                actor.require(q.store_id, Capability::CreateQuotations)?;
                q.remove_line_item(item_id, now).map(|_| ())
            })
            .await?;
        Ok(quotation)
    }

    pub async fn update_terms(
        &self,
        actor: &Actor,
        id: Uuid,
        terms: QuotationTerms,
    ) -> Result<Quotation, AppError> {
        let (quotation, _) = self
            .update(id, |q, now| {
                actor.require(q.store_id, Capability::CreateQuotations)?;
                q.update_terms(terms.clone(), now)
            })
            .await?;
        Ok(quotation)
    }

    async fn load(&self, id: Uuid) -> Result<Quotation, AppError> {
        self.repo
            .get_quotation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quotation {} not found", id)))
    }

    /// Read-modify-write with optimistic locking. `apply` runs against a fresh
    /// copy on every attempt; nothing is persisted when it fails.
    #[instrument(skip(self, apply), fields(quotation_id = %id))]
    async fn update<T, F>(&self, id: Uuid, mut apply: F) -> Result<(Quotation, T), AppError>
    where
        F: FnMut(&mut Quotation, DateTime<Utc>) -> Result<T, AppError> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let mut quotation = self.load(id).await?;
            let output = apply(&mut quotation, self.clock.now())?;

            match self.repo.save_quotation(&quotation).await {
                Ok(saved) => return Ok((saved, output)),
                Err(e) if is_stale_version(&e) && attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(attempt = attempt, "Quotation changed concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn record_transition(&self, quotation: &Quotation, message: &str) {
        QUOTATION_TRANSITIONS_TOTAL
            .with_label_values(&[quotation.status().as_str()])
            .inc();
        info!(
            quotation_id = %quotation.id,
            quotation_number = %quotation.quotation_number(),
            status = quotation.status().as_str(),
            "{}",
            message
        );
    }
}

fn require_customer(actor: &Actor, quotation: &Quotation) -> Result<(), AppError> {
    if actor.actor_id != quotation.customer_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the customer of the service request may respond to quotation {}",
            quotation.quotation_number()
        )));
    }
    Ok(())
}

/// Restrict a listing to what `actor` may see: a store it belongs to, or its own documents.
pub(crate) fn scope_to_actor(
    actor: &Actor,
    store_id: Option<Uuid>,
    customer_id: &mut Option<Uuid>,
) -> Result<(), AppError> {
    if actor.is_admin() {
        return Ok(());
    }
    if let Some(store_id) = store_id {
        if actor.is_member_of(store_id) {
            return Ok(());
        }
    }
    match *customer_id {
        Some(id) if id != actor.actor_id => Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to list documents of another customer"
        ))),
        _ => {
            *customer_id = Some(actor.actor_id);
            Ok(())
        }
    }
}
