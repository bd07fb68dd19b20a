//! Money calculation utilities using rust_decimal for precision
//!
//! All calculations are done using `Decimal` internally, then converted to
//! `f64` for storage/serialization. Totals are always recomputed here from
//! server-side prices; client-supplied amounts never reach these functions.

use crate::common::AppError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use shared::order::LineItem;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed unit price per item
const MAX_UNIT_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per line
const MAX_QUANTITY: i32 = 999;

/// Validate that a f64 value is finite (not NaN, not Infinity)
#[inline]
fn require_finite(value: f64, field_name: &str) -> Result<(), AppError> {
    if !value.is_finite() {
        return Err(AppError::Validation(format!(
            "{} must be a finite number, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Validate a line quantity: positive integer within bounds
pub fn validate_quantity(quantity: i32) -> Result<(), AppError> {
    if quantity < 1 {
        return Err(AppError::Validation(format!(
            "quantity must be a positive integer, got {}",
            quantity
        )));
    }
    if quantity > MAX_QUANTITY {
        return Err(AppError::Validation(format!(
            "quantity exceeds maximum allowed ({}), got {}",
            MAX_QUANTITY, quantity
        )));
    }
    Ok(())
}

/// Validate a unit price coming from the menu collaborator
pub fn validate_unit_price(price: f64) -> Result<(), AppError> {
    require_finite(price, "unit_price")?;
    if price < 0.0 {
        return Err(AppError::Validation(format!(
            "unit_price must be non-negative, got {}",
            price
        )));
    }
    if price > MAX_UNIT_PRICE {
        return Err(AppError::Validation(format!(
            "unit_price exceeds maximum allowed ({}), got {}",
            MAX_UNIT_PRICE, price
        )));
    }
    Ok(())
}

fn to_decimal(value: f64, field_name: &str) -> Result<Decimal, AppError> {
    require_finite(value, field_name)?;
    Decimal::from_f64(value).ok_or_else(|| {
        AppError::Validation(format!("{} is not representable: {}", field_name, value))
    })
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Line total: unit price × quantity, rounded to cents
pub fn line_total(unit_price: f64, quantity: i32) -> Result<f64, AppError> {
    let price = to_decimal(unit_price, "unit_price")?;
    let total = round_money(price * Decimal::from(quantity));
    total
        .to_f64()
        .ok_or_else(|| AppError::Internal("line total out of range".into()))
}

/// Order total: sum of line totals, rounded to cents
pub fn order_total(items: &[LineItem]) -> Result<f64, AppError> {
    let mut sum = Decimal::ZERO;
    for item in items {
        sum += to_decimal(item.line_total, "line_total")?;
    }
    round_money(sum)
        .to_f64()
        .ok_or_else(|| AppError::Internal("order total out of range".into()))
}
