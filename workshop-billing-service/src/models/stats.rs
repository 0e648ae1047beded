//! Aggregate figures over quotations and invoices.
//!
//! Repositories return one [`StatusTally`] per status; the derived figures are
//! computed here so every storage backend reports them identically.

use super::invoice::PaymentStatus;
use super::line_item::round2;
use super::quotation::QuotationStatus;
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Count and summed amounts of the documents in one status.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StatusTally {
    pub status: String,
    pub count: i64,
    pub amount: Decimal,
    pub paid: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotationStats {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    pub approved_value: Decimal,
    /// approved / (approved + rejected), 0 when nothing is resolved yet.
    pub approval_rate: Decimal,
}

impl QuotationStats {
    pub fn from_tallies(tallies: &[StatusTally]) -> Self {
        let mut by_status: BTreeMap<&'static str, i64> = QuotationStatus::ALL
            .iter()
            .map(|s| (s.as_str(), 0))
            .collect();
        let mut approved_value = Decimal::ZERO;

        for tally in tallies {
            let Some(status) = QuotationStatus::ALL
                .iter()
                .find(|s| s.as_str() == tally.status)
            else {
                continue;
            };
            *by_status.entry(status.as_str()).or_default() += tally.count;
            if *status == QuotationStatus::Approved {
                approved_value += tally.amount;
            }
        }

        let approved = by_status[QuotationStatus::Approved.as_str()];
        let rejected = by_status[QuotationStatus::Rejected.as_str()];
        let approval_rate = if approved + rejected == 0 {
            Decimal::ZERO
        } else {
            round2(Decimal::from(approved) / Decimal::from(approved + rejected))
        };

        Self {
            total: by_status.values().sum(),
            by_status,
            approved_value,
            approval_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceStats {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    /// Sum of invoice totals, cancelled invoices excluded.
    pub total_invoiced: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}

impl InvoiceStats {
    pub fn from_tallies(tallies: &[StatusTally]) -> Self {
        let mut by_status: BTreeMap<&'static str, i64> = PaymentStatus::ALL
            .iter()
            .map(|s| (s.as_str(), 0))
            .collect();
        let mut total_invoiced = Decimal::ZERO;
        let mut total_paid = Decimal::ZERO;

        for tally in tallies {
            let Some(status) = PaymentStatus::ALL
                .iter()
                .find(|s| s.as_str() == tally.status)
            else {
                continue;
            };
            *by_status.entry(status.as_str()).or_default() += tally.count;
            if *status != PaymentStatus::Cancelled {
                total_invoiced += tally.amount;
                total_paid += tally.paid;
            }
        }

        Self {
            total: by_status.values().sum(),
            by_status,
            total_invoiced,
            total_paid,
            total_outstanding: total_invoiced - total_paid,
        }
    }
}
