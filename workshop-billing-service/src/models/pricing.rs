//! Line-item arithmetic shared by quotations and invoices.
//!
//! `subtotal`, `tax_amount` and `total` are private and only ever produced by
//! [`Pricing::recompute`], which every mutator calls before returning.

use super::line_item::{line_total, round2, LineItem, LineItemChanges, NewLineItem, MAX_AMOUNT};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Derived amounts of a set of line items under a tax rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Compute document totals from scratch.
///
/// Each item is rounded to cents before summation; tax is rounded once on the subtotal.
/// Fails when the total would not fit a stored amount.
pub fn compute_totals(items: &[LineItem], tax_rate: Decimal) -> Result<Totals, AppError> {
    let subtotal = items.iter().try_fold(Decimal::ZERO, |sum, item| {
        sum.checked_add(line_total(item.quantity(), item.unit_price())?)
            .ok_or_else(too_large)
    })?;
    let tax_amount = subtotal
        .checked_mul(tax_rate)
        .map(|taxed| round2(taxed / Decimal::ONE_HUNDRED))
        .ok_or_else(too_large)?;
    let total = subtotal.checked_add(tax_amount).ok_or_else(too_large)?;

    if total > MAX_AMOUNT {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Document total {} exceeds the maximum of {}",
            total,
            MAX_AMOUNT
        )));
    }

    Ok(Totals {
        subtotal,
        tax_amount,
        total,
    })
}

fn too_large() -> AppError {
    AppError::BadRequest(anyhow::anyhow!(
        "Document total exceeds the maximum of {}",
        MAX_AMOUNT
    ))
}

/// Ensure a tax rate is a percentage in `[0, 100]`.
pub fn validate_tax_rate(tax_rate: Decimal) -> Result<(), AppError> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Tax rate must be between 0 and 100, got {}",
            tax_rate
        )));
    }
    Ok(())
}

/// The priced body of a quotation or invoice. Mutators leave it untouched on error.
#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    line_items: Vec<LineItem>,
    tax_rate: Decimal,
    totals: Totals,
}

impl Pricing {
    /// Price a new document. At least one line item is required.
    pub fn new(items: Vec<NewLineItem>, tax_rate: Decimal) -> Result<Self, AppError> {
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one line item is required"
            )));
        }
        validate_tax_rate(tax_rate)?;

        let line_items = items
            .into_iter()
            .map(LineItem::new)
            .collect::<Result<Vec<_>, _>>()?;

        Self::restore(line_items, tax_rate)
    }

    /// Rebuild from already-validated items (storage, or copying another document).
    pub fn restore(line_items: Vec<LineItem>, tax_rate: Decimal) -> Result<Self, AppError> {
        let totals = compute_totals(&line_items, tax_rate)?;
        Ok(Self {
            line_items,
            tax_rate,
            totals,
        })
    }

    /// Append a new item and return its id.
    pub fn add_item(&mut self, input: NewLineItem) -> Result<Uuid, AppError> {
        let item = LineItem::new(input)?;
        let id = item.id();
        self.recompute_with(|items| items.push(item))?;
        Ok(id)
    }

    pub fn update_item(&mut self, item_id: Uuid, changes: LineItemChanges) -> Result<(), AppError> {
        let mut item = self
            .line_items
            .iter()
            .find(|item| item.id() == item_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Line item {} not found", item_id)))?;
        item.apply(changes)?;
        self.recompute_with(|items| {
            if let Some(slot) = items.iter_mut().find(|i| i.id() == item_id) {
                *slot = item;
            }
        })
    }

    /// Remove an item. The last remaining item cannot be removed.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<LineItem, AppError> {
        let index = self
            .line_items
            .iter()
            .position(|item| item.id() == item_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Line item {} not found", item_id)))?;

        if self.line_items.len() == 1 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot remove the last line item"
            )));
        }

        let removed = self.line_items[index].clone();
        self.recompute_with(|items| {
            items.remove(index);
        })?;
        Ok(removed)
    }

    pub fn set_tax_rate(&mut self, tax_rate: Decimal) -> Result<(), AppError> {
        validate_tax_rate(tax_rate)?;
        self.totals = compute_totals(&self.line_items, tax_rate)?;
        self.tax_rate = tax_rate;
        Ok(())
    }

    /// Apply `edit` to a copy of the items and commit it only if the totals still fit.
    fn recompute_with(
        &mut self,
        edit: impl FnOnce(&mut Vec<LineItem>),
    ) -> Result<(), AppError> {
        let mut items = self.line_items.clone();
        edit(&mut items);
        self.totals = compute_totals(&items, self.tax_rate)?;
        self.line_items = items;
        Ok(())
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn subtotal(&self) -> Decimal {
        self.totals.subtotal
    }

    pub fn tax_amount(&self) -> Decimal {
        self.totals.tax_amount
    }

    pub fn total(&self) -> Decimal {
        self.totals.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MAX_QUANTITY, MAX_UNIT_PRICE};
    use rust_decimal_macros::dec;

    fn line(description: &str, quantity: Decimal, unit_price: Decimal) -> NewLineItem {
        NewLineItem {
            description: description.to_string(),
            quantity,
            unit_price,
        }
    }

    fn tune_up() -> Pricing {
        Pricing::new(
            vec![
                line("Brake pads", dec!(2), dec!(25.00)),
                line("Labour", dec!(2), dec!(50.00)),
            ],
            dec!(8.5),
        )
        .unwrap()
    }

    #[test]
    fn computes_subtotal_tax_and_total() {
        let pricing = tune_up();
        assert_eq!(pricing.subtotal(), dec!(150.00));
        assert_eq!(pricing.tax_amount(), dec!(12.75));
        assert_eq!(pricing.total(), dec!(162.75));
    }

    #[test]
    fn items_are_rounded_before_summation() {
        // 3 x 0.335 = 1.005 -> 1.01 per item, so 2.02 rather than round2(2.01)
        let pricing = Pricing::new(
            vec![
                line("Spoke", dec!(3), dec!(0.335)),
                line("Spoke", dec!(3), dec!(0.335)),
            ],
            dec!(0),
        )
        .unwrap();
        assert_eq!(pricing.subtotal(), dec!(2.02));
    }

    #[test]
    fn requires_at_least_one_item_and_valid_rate() {
        assert!(matches!(
            Pricing::new(vec![], dec!(5)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            Pricing::new(vec![line("Chain", dec!(1), dec!(30))], dec!(100.01)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            Pricing::new(vec![line("Chain", dec!(1), dec!(30))], dec!(-1)),
            Err(AppError::BadRequest(_))
        ));
        assert!(Pricing::new(vec![line("Chain", dec!(1), dec!(30))], dec!(100)).is_ok());
    }

    #[test]
    fn incremental_edits_match_recomputation_from_scratch() {
        let mut pricing = tune_up();
        let cable = pricing
            .add_item(line("Shift cable", dec!(1), dec!(12.99)))
            .unwrap();
        pricing
            .update_item(
                cable,
                LineItemChanges {
                    quantity: Some(dec!(2)),
                    ..Default::default()
                },
            )
            .unwrap();
        let first = pricing.line_items()[0].id();
        pricing.remove_item(first).unwrap();
        pricing.set_tax_rate(dec!(10)).unwrap();

        let fresh = compute_totals(pricing.line_items(), pricing.tax_rate()).unwrap();
        assert_eq!(pricing.totals(), fresh);
        assert_eq!(pricing.subtotal(), dec!(125.98));
        assert_eq!(pricing.tax_amount(), dec!(12.60));
        assert_eq!(pricing.total(), dec!(138.58));
    }

    #[test]
    fn cannot_remove_last_item_or_unknown_item() {
        let mut pricing = Pricing::new(vec![line("Chain", dec!(1), dec!(30))], dec!(0)).unwrap();
        let only = pricing.line_items()[0].id();
        assert!(matches!(
            pricing.remove_item(Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            pricing.remove_item(only),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(pricing.line_items().len(), 1);
    }

    #[test]
    fn totals_beyond_storable_amount_are_rejected_without_changes() {
        let largest = || line("Frame build", MAX_QUANTITY, MAX_UNIT_PRICE);
        // 4999 x 10^13 doubled by 100% tax stays just under the limit
        let mut pricing =
            Pricing::new((0..4999).map(|_| largest()).collect(), dec!(100)).unwrap();
        assert_eq!(pricing.total(), dec!(99980000000000000.00));
        let before = pricing.clone();

        assert!(matches!(
            pricing.add_item(largest()),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(pricing, before);

        assert!(matches!(
            Pricing::new((0..5000).map(|_| largest()).collect(), dec!(100)),
            Err(AppError::BadRequest(_))
        ));

        let mut untaxed =
            Pricing::new((0..5000).map(|_| largest()).collect(), dec!(0)).unwrap();
        assert!(untaxed.set_tax_rate(dec!(100)).is_err());
        assert_eq!(untaxed.tax_rate(), dec!(0));
    }

    #[test]
    fn invalid_tax_rate_change_keeps_previous_totals() {
        let mut pricing = tune_up();
        let before = pricing.totals();
        assert!(pricing.set_tax_rate(dec!(150)).is_err());
        assert_eq!(pricing.totals(), before);
        assert_eq!(pricing.tax_rate(), dec!(8.5));
    }
}
