//! Invoice model for workshop-billing-service.

use super::line_item::{round2, LineItem, NewLineItem};
use super::pricing::Pricing;
use super::workshop::{ServiceRecord, ServiceRequest};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_DUE_DAYS: i64 = 365;

/// Invoice payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Partial,
        PaymentStatus::Paid,
        PaymentStatus::Overdue,
        PaymentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            "overdue" => Ok(PaymentStatus::Overdue),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// Payment status as a pure function of the amounts and dates involved.
///
/// Full payment wins over everything; any partial payment reports `Partial`
/// even past the due date. `Cancelled` is never produced here.
pub fn payment_status(
    paid_amount: Decimal,
    total: Decimal,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PaymentStatus {
    if paid_amount >= total {
        PaymentStatus::Paid
    } else if paid_amount > Decimal::ZERO {
        PaymentStatus::Partial
    } else if now > due_date {
        PaymentStatus::Overdue
    } else {
        PaymentStatus::Pending
    }
}

pub fn validate_due_days(due_days: i64) -> Result<(), AppError> {
    if !(0..=MAX_DUE_DAYS).contains(&due_days) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Due days must be between 0 and {}, got {}",
            MAX_DUE_DAYS,
            due_days
        )));
    }
    Ok(())
}

/// A recorded payment against an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Input for creating an invoice.
///
/// Without `line_items` the invoice copies the line items and tax rate of
/// `quotation_id`.
#[derive(Debug, Clone, Default)]
pub struct NewInvoice {
    pub service_record_id: Uuid,
    pub quotation_id: Option<Uuid>,
    pub line_items: Option<Vec<NewLineItem>>,
    pub tax_rate: Option<Decimal>,
    pub due_days: Option<i64>,
    pub notes: Option<String>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Everything needed to issue an invoice once collaborators are resolved.
#[derive(Debug, Clone)]
pub struct InvoiceParts {
    pub invoice_number: String,
    pub quotation_id: Option<Uuid>,
    pub created_by_id: Uuid,
    pub pricing: Pricing,
    pub due_days: i64,
    pub notes: Option<String>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub service_record_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
}

/// A post-work bill for a completed service record.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub service_record_id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub quotation_id: Option<Uuid>,
    pub created_by_id: Uuid,
    invoice_number: String,
    pricing: Pricing,
    paid_amount: Decimal,
    payment_status: PaymentStatus,
    due_date: DateTime<Utc>,
    paid_date: Option<DateTime<Utc>>,
    payments: Vec<Payment>,
    notes: Option<String>,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl Invoice {
    /// Issue an invoice for a completed service record.
    pub fn issue(
        record: &ServiceRecord,
        request: &ServiceRequest,
        parts: InvoiceParts,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if !record.is_completed() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Service record {} is {}; invoices require a completed record",
                record.id,
                record.status.as_str()
            )));
        }
        validate_due_days(parts.due_days)?;

        let due_date = now + Duration::days(parts.due_days);
        let total = parts.pricing.total();

        Ok(Self {
            id: Uuid::new_v4(),
            service_record_id: record.id,
            store_id: request.store_id,
            customer_id: request.customer_id,
            quotation_id: parts.quotation_id,
            created_by_id: parts.created_by_id,
            invoice_number: parts.invoice_number,
            pricing: parts.pricing,
            paid_amount: Decimal::ZERO,
            payment_status: payment_status(Decimal::ZERO, total, due_date, now),
            due_date,
            paid_date: (total <= Decimal::ZERO).then_some(now),
            payments: Vec::new(),
            notes: parts
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// Status as of `now`. Cancelled invoices stay cancelled.
    pub fn current_status(&self, now: DateTime<Utc>) -> PaymentStatus {
        if self.payment_status == PaymentStatus::Cancelled {
            PaymentStatus::Cancelled
        } else {
            payment_status(self.paid_amount, self.total(), self.due_date, now)
        }
    }

    /// Re-derive the stored status at `now`. Returns whether it changed.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> bool {
        let status = self.current_status(now);
        if status == self.payment_status {
            return false;
        }
        self.payment_status = status;
        self.updated_at = now;
        true
    }

    pub fn balance_due(&self) -> Decimal {
        self.total() - self.paid_amount
    }

    /// Record a payment of `amount` made at `paid_at`.
    pub fn record_payment(
        &mut self,
        amount: Decimal,
        paid_at: DateTime<Utc>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Payment, AppError> {
        match self.payment_status {
            PaymentStatus::Cancelled => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is cancelled",
                    self.invoice_number
                )))
            }
            PaymentStatus::Paid => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is already paid",
                    self.invoice_number
                )))
            }
            _ => {}
        }

        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be greater than zero, got {}",
                amount
            )));
        }
        if round2(amount) != amount {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must have at most two decimal places, got {}",
                amount
            )));
        }
        let remaining = self.balance_due();
        if amount > remaining {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount {} exceeds remaining balance {:.2}",
                amount,
                remaining
            )));
        }

        self.paid_amount += amount;
        self.payment_status = payment_status(self.paid_amount, self.total(), self.due_date, now);
        if self.payment_status == PaymentStatus::Paid {
            self.paid_date = Some(paid_at);
        }
        self.updated_at = now;

        let payment = Payment {
            id: Uuid::new_v4(),
            amount,
            paid_at,
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        };
        self.payments.push(payment.clone());
        Ok(payment)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.payment_status == PaymentStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is already cancelled",
                self.invoice_number
            )));
        }
        if self.paid_amount > Decimal::ZERO {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} has recorded payments and cannot be cancelled",
                self.invoice_number
            )));
        }
        self.payment_status = PaymentStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub(crate) fn renumber(&mut self, invoice_number: String) {
        self.invoice_number = invoice_number;
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn line_items(&self) -> &[LineItem] {
        self.pricing.line_items()
    }

    pub fn tax_rate(&self) -> Decimal {
        self.pricing.tax_rate()
    }

    pub fn subtotal(&self) -> Decimal {
        self.pricing.subtotal()
    }

    pub fn tax_amount(&self) -> Decimal {
        self.pricing.tax_amount()
    }

    pub fn total(&self) -> Decimal {
        self.pricing.total()
    }

    pub fn paid_amount(&self) -> Decimal {
        self.paid_amount
    }

    /// Stored status, as last persisted.
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn paid_date(&self) -> Option<DateTime<Utc>> {
        self.paid_date
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Database row for the `invoices` table.
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub service_record_id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub quotation_id: Option<Uuid>,
    pub created_by_id: Uuid,
    pub invoice_number: String,
    pub line_items: Json<Vec<LineItem>>,
    pub tax_rate: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: String,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub payments: Json<Vec<Payment>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = AppError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let payment_status = PaymentStatus::from_str(&row.payment_status).map_err(|_| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Invoice {} has unknown payment status '{}'",
                row.id,
                row.payment_status
            ))
        })?;
        let pricing = Pricing::restore(row.line_items.0, row.tax_rate).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Invoice {} has invalid line items: {}",
                row.id,
                e
            ))
        })?;

        Ok(Self {
            id: row.id,
            service_record_id: row.service_record_id,
            store_id: row.store_id,
            customer_id: row.customer_id,
            quotation_id: row.quotation_id,
            created_by_id: row.created_by_id,
            invoice_number: row.invoice_number,
            pricing,
            paid_amount: row.paid_amount,
            payment_status,
            due_date: row.due_date,
            paid_date: row.paid_date,
            payments: row.payments.0,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workshop::ServiceRecordStatus;
    use rust_decimal_macros::dec;

    fn fixtures(status: ServiceRecordStatus) -> (ServiceRecord, ServiceRequest) {
        let request = ServiceRequest {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            store_id: Uuid::new_v4(),
        };
        let record = ServiceRecord {
            id: Uuid::new_v4(),
            service_request_id: request.id,
            status,
        };
        (record, request)
    }

    fn parts(unit_price: Decimal, tax_rate: Decimal, due_days: i64) -> InvoiceParts {
        InvoiceParts {
            invoice_number: "INV-20260101-000001".to_string(),
            quotation_id: None,
            created_by_id: Uuid::new_v4(),
            pricing: Pricing::new(
                vec![NewLineItem {
                    description: "Full service".to_string(),
                    quantity: dec!(1),
                    unit_price,
                }],
                tax_rate,
            )
            .unwrap(),
            due_days,
            notes: None,
        }
    }

    fn invoice(now: DateTime<Utc>) -> Invoice {
        let (record, request) = fixtures(ServiceRecordStatus::Completed);
        // 50.00 + 8.5% = 54.25
        Invoice::issue(&record, &request, parts(dec!(50.00), dec!(8.5), 30), now).unwrap()
    }

    #[test]
    fn status_rule_table() {
        let now = Utc::now();
        let future = now + Duration::days(1);
        let past = now - Duration::days(1);
        let total = dec!(100.00);

        assert_eq!(payment_status(dec!(0), total, future, now), PaymentStatus::Pending);
        assert_eq!(payment_status(dec!(0), total, now, now), PaymentStatus::Pending);
        assert_eq!(payment_status(dec!(0), total, past, now), PaymentStatus::Overdue);
        assert_eq!(payment_status(dec!(10), total, future, now), PaymentStatus::Partial);
        assert_eq!(payment_status(dec!(10), total, past, now), PaymentStatus::Partial);
        assert_eq!(payment_status(dec!(100), total, past, now), PaymentStatus::Paid);
        assert_eq!(payment_status(dec!(0), dec!(0), past, now), PaymentStatus::Paid);
    }

    #[test]
    fn issue_requires_completed_record_and_sane_due_days() {
        let now = Utc::now();
        let (record, request) = fixtures(ServiceRecordStatus::InProgress);
        assert!(matches!(
            Invoice::issue(&record, &request, parts(dec!(10), dec!(0), 30), now),
            Err(AppError::Conflict(_))
        ));

        let (record, request) = fixtures(ServiceRecordStatus::Completed);
        assert!(matches!(
            Invoice::issue(&record, &request, parts(dec!(10), dec!(0), 366), now),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            Invoice::issue(&record, &request, parts(dec!(10), dec!(0), -1), now),
            Err(AppError::BadRequest(_))
        ));

        let inv = Invoice::issue(&record, &request, parts(dec!(10), dec!(0), 0), now).unwrap();
        assert_eq!(inv.due_date(), now);
        assert_eq!(inv.payment_status(), PaymentStatus::Pending);
        assert_eq!(inv.store_id, request.store_id);
    }

    #[test]
    fn zero_total_invoice_is_paid_on_issue() {
        let now = Utc::now();
        let (record, request) = fixtures(ServiceRecordStatus::Completed);
        let inv = Invoice::issue(&record, &request, parts(dec!(0), dec!(10), 30), now).unwrap();
        assert_eq!(inv.payment_status(), PaymentStatus::Paid);
        assert_eq!(inv.paid_date(), Some(now));
    }

    #[test]
    fn partial_then_overpay_then_settle() {
        let now = Utc::now();
        let mut inv = invoice(now);
        assert_eq!(inv.total(), dec!(54.25));

        inv.record_payment(dec!(25.00), now, None, now).unwrap();
        assert_eq!(inv.paid_amount(), dec!(25.00));
        assert_eq!(inv.payment_status(), PaymentStatus::Partial);

        assert!(matches!(
            inv.record_payment(dec!(30.00), now, None, now),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(inv.paid_amount(), dec!(25.00));

        let paid_at = now + Duration::hours(2);
        inv.record_payment(dec!(29.25), paid_at, Some("card".into()), now)
            .unwrap();
        assert_eq!(inv.payment_status(), PaymentStatus::Paid);
        assert_eq!(inv.paid_date(), Some(paid_at));
        assert_eq!(inv.balance_due(), dec!(0));
        assert_eq!(inv.payments().len(), 2);

        assert!(matches!(
            inv.record_payment(dec!(1.00), now, None, now),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn rejects_non_positive_and_sub_cent_amounts() {
        let now = Utc::now();
        let mut inv = invoice(now);
        for amount in [dec!(0), dec!(-5), dec!(1.005)] {
            assert!(matches!(
                inv.record_payment(amount, now, None, now),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(inv.payments().is_empty());
    }

    #[test]
    fn cancel_only_when_unpaid() {
        let now = Utc::now();
        let mut unpaid = invoice(now);
        unpaid.cancel(now).unwrap();
        assert_eq!(unpaid.payment_status(), PaymentStatus::Cancelled);
        assert!(matches!(unpaid.cancel(now), Err(AppError::Conflict(_))));
        assert!(matches!(
            unpaid.record_payment(dec!(1), now, None, now),
            Err(AppError::Conflict(_))
        ));
        assert!(!unpaid.refresh_status(now + Duration::days(90)));

        let mut partly = invoice(now);
        partly.record_payment(dec!(1), now, None, now).unwrap();
        assert!(matches!(partly.cancel(now), Err(AppError::Conflict(_))));
    }

    #[test]
    fn refresh_marks_overdue_without_payment() {
        let now = Utc::now();
        let mut inv = invoice(now);
        let late = now + Duration::days(31);
        assert_eq!(inv.current_status(late), PaymentStatus::Overdue);
        assert!(inv.refresh_status(late));
        assert_eq!(inv.payment_status(), PaymentStatus::Overdue);
        assert!(!inv.refresh_status(late));

        inv.record_payment(dec!(5), late, None, late).unwrap();
        assert_eq!(inv.payment_status(), PaymentStatus::Partial);
    }
}
