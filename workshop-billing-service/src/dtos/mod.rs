//! Request and response bodies for the HTTP API.

mod invoice;
mod quotation;

pub use invoice::*;
pub use quotation::*;

use crate::models::{LineItem, NewLineItem, MAX_QUANTITY, MAX_UNIT_PRICE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Monetary amounts leave the service as strings with exactly two decimals.
pub fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

pub(crate) fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

pub(crate) fn validate_quantity(value: &Decimal) -> Result<(), ValidationError> {
    validate_positive(value)?;
    if *value > MAX_QUANTITY {
        return Err(ValidationError::new("quantity_too_large"));
    }
    Ok(())
}

pub(crate) fn validate_unit_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    if *value > MAX_UNIT_PRICE {
        return Err(ValidationError::new("unit_price_too_large"));
    }
    Ok(())
}

pub(crate) fn validate_percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("tax_rate_out_of_range"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500, message = "Description is required"))]
    pub description: String,
    #[validate(custom(function = "validate_quantity"))]
    pub quantity: Decimal,
    #[validate(custom(function = "validate_unit_price"))]
    pub unit_price: Decimal,
}

impl From<LineItemRequest> for NewLineItem {
    fn from(req: LineItemRequest) -> Self {
        NewLineItem {
            description: req.description,
            quantity: req.quantity,
            unit_price: req.unit_price,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemResponse {
    pub id: uuid::Uuid,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id(),
            description: item.description().to_string(),
            quantity: item.quantity().normalize().to_string(),
            unit_price: money(item.unit_price()),
            total: money(item.total()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub store_id: Option<uuid::Uuid>,
}
