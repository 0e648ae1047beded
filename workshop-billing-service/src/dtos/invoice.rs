use super::{money, validate_percentage, validate_positive, LineItemRequest, LineItemResponse};
use crate::models::{
    Invoice, InvoiceFilter, InvoiceStats, NewInvoice, NewPayment, Payment, PaymentStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub service_record_id: Uuid,
    pub quotation_id: Option<Uuid>,
    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub line_items: Option<Vec<LineItemRequest>>,
    #[validate(custom(function = "validate_percentage"))]
    pub tax_rate: Option<Decimal>,
    #[validate(range(min = 0, max = 365))]
    pub due_days: Option<i64>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<CreateInvoiceRequest> for NewInvoice {
    fn from(req: CreateInvoiceRequest) -> Self {
        NewInvoice {
            service_record_id: req.service_record_id,
            quotation_id: req.quotation_id,
            line_items: req
                .line_items
                .map(|items| items.into_iter().map(Into::into).collect()),
            tax_rate: req.tax_rate,
            due_days: req.due_days,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "validate_positive"))]
    pub amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl From<RecordPaymentRequest> for NewPayment {
    fn from(req: RecordPaymentRequest) -> Self {
        NewPayment {
            amount: req.amount,
            paid_at: req.paid_at,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListParams {
    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub service_record_id: Option<Uuid>,
    pub payment_status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl InvoiceListParams {
    pub fn filter(&self) -> Result<InvoiceFilter, AppError> {
        Ok(InvoiceFilter {
            store_id: self.store_id,
            customer_id: self.customer_id,
            service_record_id: self.service_record_id,
            payment_status: self
                .payment_status
                .as_deref()
                .map(str::parse::<PaymentStatus>)
                .transpose()?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: Uuid,
    pub amount: String,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            amount: money(payment.amount),
            paid_at: payment.paid_at,
            notes: payment.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub service_record_id: Uuid,
    pub quotation_id: Option<Uuid>,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub created_by_id: Uuid,
    pub line_items: Vec<LineItemResponse>,
    pub subtotal: String,
    pub tax_rate: String,
    pub tax_amount: String,
    pub total: String,
    pub paid_amount: String,
    pub balance_due: String,
    pub payment_status: PaymentStatus,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub payments: Vec<PaymentResponse>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl InvoiceResponse {
    /// Render `invoice` with its payment status evaluated at `now`.
    pub fn new(invoice: &Invoice, now: DateTime<Utc>) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number().to_string(),
            service_record_id: invoice.service_record_id,
            quotation_id: invoice.quotation_id,
            store_id: invoice.store_id,
            customer_id: invoice.customer_id,
            created_by_id: invoice.created_by_id,
            line_items: invoice.line_items().iter().map(Into::into).collect(),
            subtotal: money(invoice.subtotal()),
            tax_rate: invoice.tax_rate().normalize().to_string(),
            tax_amount: money(invoice.tax_amount()),
            total: money(invoice.total()),
            paid_amount: money(invoice.paid_amount()),
            balance_due: money(invoice.balance_due()),
            payment_status: invoice.current_status(now),
            due_date: invoice.due_date(),
            paid_date: invoice.paid_date(),
            payments: invoice.payments().iter().map(Into::into).collect(),
            notes: invoice.notes().map(str::to_string),
            created_at: invoice.created_at,
            updated_at: invoice.updated_at(),
            version: invoice.version(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentResponse {
    pub payment: PaymentResponse,
    pub invoice: InvoiceResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatsResponse {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    pub total_invoiced: String,
    pub total_paid: String,
    pub total_outstanding: String,
}

impl From<InvoiceStats> for InvoiceStatsResponse {
    fn from(stats: InvoiceStats) -> Self {
        Self {
            total: stats.total,
            by_status: stats.by_status,
            total_invoiced: money(stats.total_invoiced),
            total_paid: money(stats.total_paid),
            total_outstanding: money(stats.total_outstanding),
        }
    }
}
