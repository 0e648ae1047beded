use super::{
    money, validate_percentage, validate_quantity, validate_unit_price, LineItemRequest,
    LineItemResponse,
};
use crate::models::{
    LineItemChanges, NewQuotation, Quotation, QuotationFilter, QuotationStats, QuotationStatus,
    QuotationTerms,
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
pub struct CreateQuotationRequest {
    pub service_request_id: Uuid,
    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub line_items: Vec<LineItemRequest>,
    #[validate(custom(function = "validate_percentage"))]
    #[serde(default)]
    pub tax_rate: Decimal,
    pub valid_until: DateTime<Utc>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<CreateQuotationRequest> for NewQuotation {
    fn from(req: CreateQuotationRequest) -> Self {
        NewQuotation {
            service_request_id: req.service_request_id,
            line_items: req.line_items.into_iter().map(Into::into).collect(),
            tax_rate: req.tax_rate,
            valid_until: req.valid_until,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuotationRequest {
    #[validate(custom(function = "validate_percentage"))]
    pub tax_rate: Option<Decimal>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<UpdateQuotationRequest> for QuotationTerms {
    fn from(req: UpdateQuotationRequest) -> Self {
        QuotationTerms {
            tax_rate: req.tax_rate,
            valid_until: req.valid_until,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLineItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_quantity"))]
    pub quantity: Option<Decimal>,
    #[validate(custom(function = "validate_unit_price"))]
    pub unit_price: Option<Decimal>,
}

impl From<UpdateLineItemRequest> for LineItemChanges {
    fn from(req: UpdateLineItemRequest) -> Self {
        LineItemChanges {
            description: req.description,
            quantity: req.quantity,
            unit_price: req.unit_price,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationListParams {
    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub service_request_id: Option<Uuid>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl QuotationListParams {
    pub fn filter(&self) -> Result<QuotationFilter, AppError> {
        Ok(QuotationFilter {
            store_id: self.store_id,
            customer_id: self.customer_id,
            service_request_id: self.service_request_id,
            status: self
                .status
                .as_deref()
                .map(str::parse::<QuotationStatus>)
                .transpose()?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationResponse {
    pub id: Uuid,
    pub quotation_number: String,
    pub service_request_id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub created_by_id: Uuid,
    pub line_items: Vec<LineItemResponse>,
    pub subtotal: String,
    pub tax_rate: String,
    pub tax_amount: String,
    pub total: String,
    pub valid_until: DateTime<Utc>,
    pub status: QuotationStatus,
    pub is_expired: bool,
    pub can_be_edited: bool,
    pub days_until_expiry: i64,
    pub is_expiring_soon: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl QuotationResponse {
    /// Render `quotation` as seen at `now`.
    pub fn new(quotation: &Quotation, now: DateTime<Utc>, expiring_soon_days: i64) -> Self {
        Self {
            id: quotation.id,
            quotation_number: quotation.quotation_number().to_string(),
            service_request_id: quotation.service_request_id,
            store_id: quotation.store_id,
            customer_id: quotation.customer_id,
            created_by_id: quotation.created_by_id,
            line_items: quotation.line_items().iter().map(Into::into).collect(),
            subtotal: money(quotation.subtotal()),
            tax_rate: quotation.tax_rate().normalize().to_string(),
            tax_amount: money(quotation.tax_amount()),
            total: money(quotation.total()),
            valid_until: quotation.valid_until(),
            status: quotation.effective_status(now),
            is_expired: quotation.is_expired(now),
            can_be_edited: quotation.can_be_edited(now),
            days_until_expiry: quotation.days_until_expiry(now),
            is_expiring_soon: quotation.effective_status(now).is_open()
                && quotation.is_expiring_soon(now, expiring_soon_days),
            notes: quotation.notes().map(str::to_string),
            created_at: quotation.created_at,
            updated_at: quotation.updated_at(),
            version: quotation.version(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationStatsResponse {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    pub approved_value: String,
    pub approval_rate: String,
}

impl From<QuotationStats> for QuotationStatsResponse {
    fn from(stats: QuotationStats) -> Self {
        Self {
            total: stats.total,
            by_status: stats.by_status,
            approved_value: money(stats.approved_value),
            approval_rate: money(stats.approval_rate),
        }
    }
}
