//! Quotation model for workshop-billing-service.
//!
//! ```text
//! draft ──send──▶ sent ──approve──▶ approved
//!   ▲               │
//!   │ revise/edit   └──reject───▶ rejected
//!   └───────────────────────────────┘
//! draft | sent ──(now > valid_until)──▶ expired
//! ```

use super::line_item::{LineItem, LineItemChanges, NewLineItem};
use super::pricing::Pricing;
use super::workshop::ServiceRequest;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Quotation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
    Expired,
}

impl QuotationStatus {
    pub const ALL: [QuotationStatus; 5] = [
        QuotationStatus::Draft,
        QuotationStatus::Sent,
        QuotationStatus::Approved,
        QuotationStatus::Rejected,
        QuotationStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Sent => "sent",
            QuotationStatus::Approved => "approved",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::Expired => "expired",
        }
    }

    /// Statuses the expiry clock still applies to.
    pub fn is_open(&self) -> bool {
        matches!(self, QuotationStatus::Draft | QuotationStatus::Sent)
    }
}

impl FromStr for QuotationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(QuotationStatus::Draft),
            "sent" => Ok(QuotationStatus::Sent),
            "approved" => Ok(QuotationStatus::Approved),
            "rejected" => Ok(QuotationStatus::Rejected),
            "expired" => Ok(QuotationStatus::Expired),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown quotation status '{}'",
                other
            ))),
        }
    }
}

/// Input for creating a quotation.
#[derive(Debug, Clone)]
pub struct NewQuotation {
    pub service_request_id: Uuid,
    pub line_items: Vec<NewLineItem>,
    pub tax_rate: Decimal,
    pub valid_until: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Changes to the commercial terms of an editable quotation.
#[derive(Debug, Clone, Default)]
pub struct QuotationTerms {
    pub tax_rate: Option<Decimal>,
    pub valid_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Filter parameters for listing quotations.
#[derive(Debug, Clone, Default)]
pub struct QuotationFilter {
    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub service_request_id: Option<Uuid>,
    pub status: Option<QuotationStatus>,
}

/// A pre-work price proposal for a service request.
#[derive(Debug, Clone, PartialEq)]
pub struct Quotation {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub created_by_id: Uuid,
    quotation_number: String,
    pricing: Pricing,
    valid_until: DateTime<Utc>,
    status: QuotationStatus,
    notes: Option<String>,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl Quotation {
    /// Create a draft quotation against `request`.
    pub fn draft(
        input: NewQuotation,
        request: &ServiceRequest,
        created_by_id: Uuid,
        quotation_number: String,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if input.valid_until <= now {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Quotation validity date must be in the future"
            )));
        }
        let pricing = Pricing::new(input.line_items, input.tax_rate)?;

        Ok(Self {
            id: Uuid::new_v4(),
            service_request_id: request.id,
            store_id: request.store_id,
            customer_id: request.customer_id,
            created_by_id,
            quotation_number,
            pricing,
            valid_until: input.valid_until,
            status: QuotationStatus::Draft,
            notes: normalize_notes(input.notes),
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    // ---------------------------------------------------------------------
    // Derived state
    // ---------------------------------------------------------------------

    /// Status as of `now`: open quotations past their validity read as expired.
    ///
    /// The sweep and the on-demand guards both go through this function.
    pub fn effective_status(&self, now: DateTime<Utc>) -> QuotationStatus {
        if self.status.is_open() && now > self.valid_until {
            QuotationStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == QuotationStatus::Expired || now > self.valid_until
    }

    pub fn can_be_edited(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.effective_status(now),
            QuotationStatus::Draft | QuotationStatus::Rejected
        )
    }

    /// Whole days until `valid_until`, rounded up; zero or negative once passed.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        let seconds = (self.valid_until - now).num_seconds();
        if seconds > 0 {
            (seconds + 86_399) / 86_400
        } else {
            seconds / 86_400
        }
    }

    pub fn is_expiring_soon(&self, now: DateTime<Utc>, days: i64) -> bool {
        let remaining = self.days_until_expiry(now);
        remaining > 0 && remaining <= days
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    pub fn send(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.effective_status(now) {
            QuotationStatus::Draft => {
                self.set_status(QuotationStatus::Sent, now);
                Ok(())
            }
            QuotationStatus::Expired => Err(self.expired_error()),
            other => Err(AppError::Conflict(anyhow::anyhow!(
                "Only draft quotations can be sent; quotation {} is {}",
                self.quotation_number,
                other.as_str()
            ))),
        }
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        self.resolve(QuotationStatus::Approved, now)
    }

    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        self.resolve(QuotationStatus::Rejected, now)
    }

    fn resolve(&mut self, outcome: QuotationStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if matches!(
            self.status,
            QuotationStatus::Approved | QuotationStatus::Rejected
        ) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Quotation {} has already been {}",
                self.quotation_number,
                self.status.as_str()
            )));
        }
        if self.is_expired(now) {
            return Err(self.expired_error());
        }
        if self.status != QuotationStatus::Sent {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Quotation {} must be sent before it can be {}",
                self.quotation_number,
                outcome.as_str()
            )));
        }

        self.set_status(outcome, now);
        Ok(())
    }

    /// Reopen a rejected quotation as a draft. Its validity must not have lapsed.
    pub fn revise(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status != QuotationStatus::Rejected {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Only rejected quotations can be revised; quotation {} is {}",
                self.quotation_number,
                self.status.as_str()
            )));
        }
        self.ensure_reopenable(self.valid_until, now)?;
        self.set_status(QuotationStatus::Draft, now);
        Ok(())
    }

    /// Mark as expired if still open and past validity. Returns whether anything changed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.effective_status(now) == QuotationStatus::Expired
            && self.status != QuotationStatus::Expired
        {
            self.set_status(QuotationStatus::Expired, now);
            true
        } else {
            false
        }
    }

    // ---------------------------------------------------------------------
    // Edits (draft or rejected only)
    // ---------------------------------------------------------------------

    pub fn add_line_item(&mut self, input: NewLineItem, now: DateTime<Utc>) -> Result<Uuid, AppError> {
        self.ensure_editable(now)?;
        self.ensure_reopenable(self.valid_until, now)?;
        let id = self.pricing.add_item(input)?;
        self.after_edit(now);
        Ok(id)
    }

    pub fn update_line_item(
        &mut self,
        item_id: Uuid,
        changes: LineItemChanges,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.ensure_editable(now)?;
        self.ensure_reopenable(self.valid_until, now)?;
        self.pricing.update_item(item_id, changes)?;
        self.after_edit(now);
        Ok(())
    }

    pub fn remove_line_item(&mut self, item_id: Uuid, now: DateTime<Utc>) -> Result<LineItem, AppError> {
        self.ensure_editable(now)?;
        self.ensure_reopenable(self.valid_until, now)?;
        let removed = self.pricing.remove_item(item_id)?;
        self.after_edit(now);
        Ok(removed)
    }

    pub fn update_terms(&mut self, terms: QuotationTerms, now: DateTime<Utc>) -> Result<(), AppError> {
        self.ensure_editable(now)?;
        if let Some(valid_until) = terms.valid_until {
            if valid_until <= now {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Quotation validity date must be in the future"
                )));
            }
        }
        self.ensure_reopenable(terms.valid_until.unwrap_or(self.valid_until), now)?;
        if let Some(tax_rate) = terms.tax_rate {
            self.pricing.set_tax_rate(tax_rate)?;
        }
        if let Some(valid_until) = terms.valid_until {
            self.valid_until = valid_until;
        }
        if terms.notes.is_some() {
            self.notes = normalize_notes(terms.notes);
        }
        self.after_edit(now);
        Ok(())
    }

    fn ensure_editable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.effective_status(now) {
            QuotationStatus::Draft | QuotationStatus::Rejected => Ok(()),
            QuotationStatus::Expired => Err(self.expired_error()),
            other => Err(AppError::Conflict(anyhow::anyhow!(
                "Quotation {} cannot be edited while {}",
                self.quotation_number,
                other.as_str()
            ))),
        }
    }

    /// A rejected quotation returns to draft only with validity still ahead of it.
    fn ensure_reopenable(
        &self,
        valid_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.status == QuotationStatus::Rejected && now > valid_until {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Quotation {} lapsed on {}; set a new validity date to reopen it",
                self.quotation_number,
                self.valid_until.format("%Y-%m-%d %H:%M UTC")
            )));
        }
        Ok(())
    }

    fn after_edit(&mut self, now: DateTime<Utc>) {
        if self.status == QuotationStatus::Rejected {
            self.status = QuotationStatus::Draft;
        }
        self.updated_at = now;
    }

    fn set_status(&mut self, status: QuotationStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    fn expired_error(&self) -> AppError {
        AppError::Conflict(anyhow::anyhow!(
            "Quotation {} expired on {}",
            self.quotation_number,
            self.valid_until.format("%Y-%m-%d %H:%M UTC")
        ))
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn quotation_number(&self) -> &str {
        &self.quotation_number
    }

    pub(crate) fn renumber(&mut self, quotation_number: String) {
        self.quotation_number = quotation_number;
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

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    /// Stored status, without the lazy expiry view.
    pub fn status(&self) -> QuotationStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Optimistic-locking version of the stored copy this value was read from.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// Database row for the `quotations` table.
#[derive(Debug, Clone, FromRow)]
pub struct QuotationRow {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub created_by_id: Uuid,
    pub quotation_number: String,
    pub line_items: Json<Vec<LineItem>>,
    pub tax_rate: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub valid_until: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl TryFrom<QuotationRow> for Quotation {
    type Error = AppError;

    fn try_from(row: QuotationRow) -> Result<Self, Self::Error> {
        let status = QuotationStatus::from_str(&row.status).map_err(|_| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Quotation {} has unknown status '{}'",
                row.id,
                row.status
            ))
        })?;
        let pricing = Pricing::restore(row.line_items.0, row.tax_rate).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Quotation {} has invalid line items: {}",
                row.id,
                e
            ))
        })?;

        Ok(Self {
            id: row.id,
            service_request_id: row.service_request_id,
            store_id: row.store_id,
            customer_id: row.customer_id,
            created_by_id: row.created_by_id,
            quotation_number: row.quotation_number,
            pricing,
            valid_until: row.valid_until,
            status,
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
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn request() -> ServiceRequest {
        ServiceRequest {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            store_id: Uuid::new_v4(),
        }
    }

    fn new_quotation(valid_until: DateTime<Utc>) -> NewQuotation {
        NewQuotation {
            service_request_id: Uuid::new_v4(),
            line_items: vec![NewLineItem {
                description: "Wheel true".to_string(),
                quantity: dec!(1),
                unit_price: dec!(40.00),
            }],
            tax_rate: dec!(10),
            valid_until,
            notes: Some("  ".to_string()),
        }
    }

    fn draft(now: DateTime<Utc>) -> Quotation {
        Quotation::draft(
            new_quotation(now + Duration::days(30)),
            &request(),
            Uuid::new_v4(),
            "QUO-20260101-000001".to_string(),
            now,
        )
        .unwrap()
    }

    #[test]
    fn draft_requires_future_validity() {
        let now = Utc::now();
        let result = Quotation::draft(
            new_quotation(now),
            &request(),
            Uuid::new_v4(),
            "QUO-1".to_string(),
            now,
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn draft_copies_request_ownership_and_prices_items() {
        let now = Utc::now();
        let req = request();
        let q = Quotation::draft(
            new_quotation(now + Duration::days(1)),
            &req,
            Uuid::new_v4(),
            "QUO-1".to_string(),
            now,
        )
        .unwrap();
        assert_eq!(q.store_id, req.store_id);
        assert_eq!(q.customer_id, req.customer_id);
        assert_eq!(q.status(), QuotationStatus::Draft);
        assert_eq!(q.total(), dec!(44.00));
        assert_eq!(q.notes(), None);
    }

    #[test]
    fn happy_path_send_then_approve() {
        let now = Utc::now();
        let mut q = draft(now);
        q.send(now).unwrap();
        assert_eq!(q.status(), QuotationStatus::Sent);
        q.approve(now).unwrap();
        assert_eq!(q.status(), QuotationStatus::Approved);
        assert!(matches!(q.approve(now), Err(AppError::Conflict(_))));
        assert!(matches!(q.reject(now), Err(AppError::Conflict(_))));
    }

    #[test]
    fn approve_requires_sent() {
        let now = Utc::now();
        let mut q = draft(now);
        assert!(matches!(q.approve(now), Err(AppError::Conflict(_))));
        assert_eq!(q.status(), QuotationStatus::Draft);
    }

    #[test]
    fn expiry_is_evaluated_lazily() {
        let now = Utc::now();
        let mut q = draft(now);
        q.send(now).unwrap();

        let later = now + Duration::days(31);
        assert_eq!(q.status(), QuotationStatus::Sent);
        assert_eq!(q.effective_status(later), QuotationStatus::Expired);
        assert!(q.is_expired(later));
        assert!(matches!(q.approve(later), Err(AppError::Conflict(_))));
        assert!(matches!(q.reject(later), Err(AppError::Conflict(_))));
        assert_eq!(q.status(), QuotationStatus::Sent);
    }

    #[test]
    fn expire_is_idempotent_and_ignores_resolved() {
        let now = Utc::now();
        let later = now + Duration::days(31);

        let mut open = draft(now);
        assert!(!open.expire(now));
        assert!(open.expire(later));
        assert_eq!(open.status(), QuotationStatus::Expired);
        assert!(!open.expire(later));

        let mut approved = draft(now);
        approved.send(now).unwrap();
        approved.approve(now).unwrap();
        assert!(!approved.expire(later));
        assert_eq!(approved.status(), QuotationStatus::Approved);
    }

    #[test]
    fn edits_only_while_draft_or_rejected() {
        let now = Utc::now();
        let mut q = draft(now);
        let item = NewLineItem {
            description: "Tube".to_string(),
            quantity: dec!(2),
            unit_price: dec!(8.00),
        };
        q.add_line_item(item.clone(), now).unwrap();
        assert_eq!(q.subtotal(), dec!(56.00));

        q.send(now).unwrap();
        assert!(!q.can_be_edited(now));
        assert!(matches!(
            q.add_line_item(item.clone(), now),
            Err(AppError::Conflict(_))
        ));

        q.reject(now).unwrap();
        assert!(q.can_be_edited(now));
        q.add_line_item(item, now).unwrap();
        assert_eq!(q.status(), QuotationStatus::Draft);
        assert_eq!(q.subtotal(), dec!(72.00));
    }

    #[test]
    fn revise_only_from_rejected() {
        let now = Utc::now();
        let mut q = draft(now);
        assert!(matches!(q.revise(now), Err(AppError::Conflict(_))));
        q.send(now).unwrap();
        q.reject(now).unwrap();
        q.revise(now).unwrap();
        assert_eq!(q.status(), QuotationStatus::Draft);
        q.send(now).unwrap();
    }

    #[test]
    fn lapsed_rejection_reopens_only_with_new_validity() {
        let now = Utc::now();
        let mut q = draft(now);
        q.send(now).unwrap();
        q.reject(now).unwrap();

        let later = now + Duration::days(31);
        let before = q.clone();
        assert!(matches!(q.revise(later), Err(AppError::Conflict(_))));
        let item = NewLineItem {
            description: "Brake pads".to_string(),
            quantity: dec!(1),
            unit_price: dec!(20.00),
        };
        assert!(matches!(
            q.add_line_item(item, later),
            Err(AppError::Conflict(_))
        ));
        let only = q.line_items()[0].id();
        assert!(matches!(
            q.update_line_item(only, LineItemChanges::default(), later),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            q.update_terms(
                QuotationTerms {
                    tax_rate: Some(dec!(0)),
                    ..Default::default()
                },
                later
            ),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(q, before);

        q.update_terms(
            QuotationTerms {
                valid_until: Some(later + Duration::days(14)),
                ..Default::default()
            },
            later,
        )
        .unwrap();
        assert_eq!(q.status(), QuotationStatus::Draft);
        assert_eq!(q.effective_status(later), QuotationStatus::Draft);
        q.send(later).unwrap();
    }

    #[test]
    fn update_terms_recomputes_and_validates() {
        let now = Utc::now();
        let mut q = draft(now);
        q.update_terms(
            QuotationTerms {
                tax_rate: Some(dec!(0)),
                notes: Some("Customer supplies parts".to_string()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(q.total(), dec!(40.00));
        assert_eq!(q.notes(), Some("Customer supplies parts"));

        let before = q.clone();
        let result = q.update_terms(
            QuotationTerms {
                tax_rate: Some(dec!(5)),
                valid_until: Some(now - Duration::hours(1)),
                ..Default::default()
            },
            now,
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(q, before);
    }

    #[test]
    fn expiring_soon_window() {
        let now = Utc::now();
        let mut q = draft(now);
        q.update_terms(
            QuotationTerms {
                valid_until: Some(now + Duration::days(2) + Duration::hours(1)),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(q.days_until_expiry(now), 3);
        assert!(q.is_expiring_soon(now, 3));
        assert!(!q.is_expiring_soon(now, 2));
        assert!(!q.is_expiring_soon(now + Duration::days(4), 3));
        assert!(q.days_until_expiry(now + Duration::days(4)) <= 0);
    }
}
