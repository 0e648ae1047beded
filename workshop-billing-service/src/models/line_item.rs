//! Line items embedded in quotations and invoices.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Round a monetary amount to cents, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Largest quantity accepted on a single line item.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Largest unit price accepted on a single line item.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Largest amount a stored money column (`NUMERIC(19,2)`) can hold: 99999999999999999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_313_682_943, 2_328_306_436, 0, false, 2);

/// `round2(quantity * unit_price)`, failing instead of overflowing.
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, AppError> {
    quantity
        .checked_mul(unit_price)
        .map(round2)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Line item total overflows for quantity {} at {}",
                quantity,
                unit_price
            ))
        })
}

/// One priced row of a document. `total` is always `round2(quantity * unit_price)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    id: Uuid,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    total: Decimal,
}

/// Fields needed to price a new line item.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Partial update of a line item; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct LineItemChanges {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

impl LineItem {
    pub fn new(input: NewLineItem) -> Result<Self, AppError> {
        validate(&input.description, input.quantity, input.unit_price)?;
        let total = line_total(input.quantity, input.unit_price)?;

        Ok(Self {
            id: Uuid::new_v4(),
            total,
            description: input.description.trim().to_string(),
            quantity: input.quantity,
            unit_price: input.unit_price,
        })
    }

    /// Merge `changes` into this item. Nothing is modified if the merged item is invalid.
    pub fn apply(&mut self, changes: LineItemChanges) -> Result<(), AppError> {
        let description = changes
            .description
            .unwrap_or_else(|| self.description.clone());
        let quantity = changes.quantity.unwrap_or(self.quantity);
        let unit_price = changes.unit_price.unwrap_or(self.unit_price);

        validate(&description, quantity, unit_price)?;
        let total = line_total(quantity, unit_price)?;

        self.description = description.trim().to_string();
        self.quantity = quantity;
        self.unit_price = unit_price;
        self.total = total;
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn total(&self) -> Decimal {
        self.total
    }
}

fn validate(description: &str, quantity: Decimal, unit_price: Decimal) -> Result<(), AppError> {
    if description.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Line item description must not be empty"
        )));
    }
    if quantity <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Line item quantity must be greater than zero, got {}",
            quantity
        )));
    }
    if quantity > MAX_QUANTITY {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Line item quantity must not exceed {}, got {}",
            MAX_QUANTITY,
            quantity
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Line item unit price must not be negative, got {}",
            unit_price
        )));
    }
    if unit_price > MAX_UNIT_PRICE {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Line item unit price must not exceed {}, got {}",
            MAX_UNIT_PRICE,
            unit_price
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: Decimal, unit_price: Decimal) -> Result<LineItem, AppError> {
        LineItem::new(NewLineItem {
            description: "Brake bleed".to_string(),
            quantity,
            unit_price,
        })
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(dec!(2.345)), dec!(2.35));
        assert_eq!(round2(dec!(2.344)), dec!(2.34));
        assert_eq!(round2(dec!(-2.345)), dec!(-2.35));
    }

    #[test]
    fn total_is_rounded_product() {
        let li = item(dec!(3), dec!(3.335)).unwrap();
        assert_eq!(li.total(), dec!(10.01));
    }

    #[test]
    fn rejects_non_positive_quantity_and_negative_price() {
        assert!(matches!(
            item(dec!(0), dec!(10)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            item(dec!(-1), dec!(10)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            item(dec!(1), dec!(-0.01)),
            Err(AppError::BadRequest(_))
        ));
        assert!(item(dec!(1), dec!(0)).is_ok());
    }

    #[test]
    fn rejects_quantities_and_prices_beyond_storable_range() {
        let huge = dec!(100000000000000000000);
        assert!(matches!(item(huge, huge), Err(AppError::BadRequest(_))));
        assert!(matches!(
            item(MAX_QUANTITY + dec!(0.01), dec!(1)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            item(dec!(1), MAX_UNIT_PRICE + dec!(0.01)),
            Err(AppError::BadRequest(_))
        ));

        let largest = item(MAX_QUANTITY, MAX_UNIT_PRICE).unwrap();
        assert_eq!(largest.total(), dec!(10000000000000));

        let mut li = item(dec!(1), dec!(10)).unwrap();
        assert!(li
            .apply(LineItemChanges {
                quantity: Some(huge),
                ..Default::default()
            })
            .is_err());
        assert_eq!(li.quantity(), dec!(1));
    }

    #[test]
    fn line_total_reports_overflow() {
        assert!(matches!(
            line_total(Decimal::MAX, dec!(2)),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(line_total(dec!(3), dec!(3.335)).unwrap(), dec!(10.01));
    }

    #[test]
    fn max_amount_is_largest_numeric_19_2() {
        assert_eq!(MAX_AMOUNT, dec!(99999999999999999.99));
    }

    #[test]
    fn apply_merges_and_recomputes_total() {
        let mut li = item(dec!(2), dec!(25.00)).unwrap();
        let id = li.id();
        li.apply(LineItemChanges {
            quantity: Some(dec!(4)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(li.id(), id);
        assert_eq!(li.description(), "Brake bleed");
        assert_eq!(li.total(), dec!(100.00));
    }

    #[test]
    fn invalid_apply_leaves_item_untouched() {
        let mut li = item(dec!(2), dec!(25.00)).unwrap();
        let before = li.clone();
        let result = li.apply(LineItemChanges {
            unit_price: Some(dec!(-5)),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(li, before);
    }
}
