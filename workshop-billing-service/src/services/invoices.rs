//! Invoice use cases: creation from completed work, payments and cancellation.

use super::clock::Clock;
use super::metrics::{INVOICES_TOTAL, PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use super::quotations::{scope_to_actor, MAX_SAVE_ATTEMPTS};
use super::repository::{is_duplicate_number, is_stale_version, DocumentRepository};
use crate::config::BillingConfig;
use crate::models::{
    generate_number, Actor, Capability, DocumentKind, Invoice, InvoiceFilter, InvoiceParts,
    InvoiceStats, NewInvoice, NewPayment, Page, Pagination, Payment, PaymentStatus, Pricing,
    QuotationStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct InvoiceService {
    repo: Arc<dyn DocumentRepository>,
    clock: Arc<dyn Clock>,
    billing: BillingConfig,
}

impl InvoiceService {
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

    #[instrument(skip(self, actor, input), fields(actor_id = %actor.actor_id, service_record_id = %input.service_record_id))]
    pub async fn create(&self, actor: &Actor, input: NewInvoice) -> Result<Invoice, AppError> {
        let record = self
            .repo
            .get_service_record(input.service_record_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Service record {} not found",
                    input.service_record_id
                ))
            })?;
        let request = self
            .repo
            .get_service_request(record.service_request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Service request {} not found",
                    record.service_request_id
                ))
            })?;
        actor.require(request.store_id, Capability::CreateInvoices)?;

        if !record.is_completed() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Service record {} is {}; invoices require a completed record",
                record.id,
                record.status.as_str()
            )));
        }

        let quotation = match input.quotation_id {
            Some(quotation_id) => {
                let quotation = self.repo.get_quotation(quotation_id).await?.ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Quotation {} not found", quotation_id))
                })?;
                if quotation.service_request_id != record.service_request_id {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Quotation {} belongs to a different service request",
                        quotation.quotation_number()
                    )));
                }
                if quotation.status() != QuotationStatus::Approved {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Quotation {} is {}; only approved quotations can be invoiced",
                        quotation.quotation_number(),
                        quotation.status().as_str()
                    )));
                }
                if self.repo.find_invoice_by_quotation(quotation_id).await?.is_some() {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Quotation {} has already been invoiced",
                        quotation.quotation_number()
                    )));
                }
                Some(quotation)
            }
            None => None,
        };

        let pricing = match (input.line_items, &quotation) {
            (Some(items), _) => Pricing::new(
                items,
                input
                    .tax_rate
                    .or(quotation.as_ref().map(|q| q.tax_rate()))
                    .unwrap_or(Decimal::ZERO),
            )?,
            (None, Some(quotation)) => {
                let mut pricing = quotation.pricing().clone();
                if let Some(tax_rate) = input.tax_rate {
                    pricing.set_tax_rate(tax_rate)?;
                }
                pricing
            }
            (None, None) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Line items are required when no quotation is referenced"
                )))
            }
        };

        let now = self.clock.now();
        let mut invoice = Invoice::issue(
            &record,
            &request,
            InvoiceParts {
                invoice_number: generate_number(DocumentKind::Invoice, now),
                quotation_id: input.quotation_id,
                created_by_id: actor.actor_id,
                pricing,
                due_days: input.due_days.unwrap_or(self.billing.default_due_days),
                notes: input.notes,
            },
            now,
        )?;

        let mut attempt = 1;
        loop {
            match self.repo.insert_invoice(&invoice).await {
                Ok(()) => break,
                Err(e) if is_duplicate_number(&e) && attempt < self.billing.max_number_retries => {
                    warn!(
                        invoice_number = %invoice.invoice_number(),
                        attempt = attempt,
                        "Invoice number collision, regenerating"
                    );
                    attempt += 1;
                    invoice.renumber(generate_number(DocumentKind::Invoice, self.clock.now()));
                }
                Err(e) => return Err(e),
            }
        }

        INVOICES_TOTAL
            .with_label_values(&[invoice.payment_status().as_str()])
            .inc();
        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number(),
            quotation_id = ?invoice.quotation_id,
            total = %invoice.total(),
            due_date = %invoice.due_date(),
            "Invoice created"
        );

        Ok(invoice)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.load(id).await?;
        actor.require_view(invoice.store_id, invoice.customer_id)?;
        Ok(invoice)
    }

    #[instrument(skip(self, actor, filter), fields(actor_id = %actor.actor_id))]
    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: InvoiceFilter,
        pagination: Pagination,
    ) -> Result<Page<Invoice>, AppError> {
        scope_to_actor(actor, filter.store_id, &mut filter.customer_id)?;
        self.repo
            .list_invoices(&filter, pagination, self.clock.now())
            .await
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn stats(&self, actor: &Actor, store_id: Option<Uuid>) -> Result<InvoiceStats, AppError> {
        actor.require_financials(store_id)?;
        let filter = InvoiceFilter {
            store_id,
            ..Default::default()
        };
        let tallies = self.repo.invoice_stats(&filter, self.clock.now()).await?;
        Ok(InvoiceStats::from_tallies(&tallies))
    }

    #[instrument(skip(self, actor, input), fields(actor_id = %actor.actor_id, invoice_id = %id, amount = %input.amount))]
    pub async fn record_payment(
        &self,
        actor: &Actor,
        id: Uuid,
        input: NewPayment,
    ) -> Result<(Invoice, Payment), AppError> {
        let (invoice, payment) = self
            .update(id, |inv, now| {
                actor.require(inv.store_id, Capability::CreateInvoices)?;
                inv.record_payment(
                    input.amount,
                    input.paid_at.unwrap_or(now),
                    input.notes.clone(),
                    now,
                )
            })
            .await?;

        PAYMENTS_TOTAL.inc();
        PAYMENT_AMOUNT_TOTAL.inc_by(payment.amount.to_f64().unwrap_or_default());
        if invoice.payment_status() == PaymentStatus::Paid {
            INVOICES_TOTAL
                .with_label_values(&[PaymentStatus::Paid.as_str()])
                .inc();
        }
        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number(),
            payment_id = %payment.id,
            amount = %payment.amount,
            paid_amount = %invoice.paid_amount(),
            status = invoice.payment_status().as_str(),
            "Payment recorded"
        );

        Ok((invoice, payment))
    }

    pub async fn cancel(&self, actor: &Actor, id: Uuid) -> Result<Invoice, AppError> {
        let (invoice, _) = self
            .update(id, |inv, now| {
                actor.require(inv.store_id, Capability::CreateInvoices)?;
                inv.cancel(now)
            })
            .await?;

        INVOICES_TOTAL
            .with_label_values(&[PaymentStatus::Cancelled.as_str()])
            .inc();
        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number(),
            "Invoice cancelled"
        );

        Ok(invoice)
    }

    async fn load(&self, id: Uuid) -> Result<Invoice, AppError> {
        self.repo
            .get_invoice(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", id)))
    }

    #[instrument(skip(self, apply), fields(invoice_id = %id))]
    async fn update<T, F>(&self, id: Uuid, mut apply: F) -> Result<(Invoice, T), AppError>
    where
        F: FnMut(&mut Invoice, DateTime<Utc>) -> Result<T, AppError> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let mut invoice = self.load(id).await?;
            let output = apply(&mut invoice, self.clock.now())?;

            match self.repo.save_invoice(&invoice).await {
                Ok(saved) => return Ok((saved, output)),
                Err(e) if is_stale_version(&e) && attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(attempt = attempt, "Invoice changed concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
