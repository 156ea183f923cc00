//! Ingredient model
//!
//! This module provides:
//! - `Ingredient` reference entity (name + measurement unit)
//! - `RecipeIngredient`, an ingredient as used by one recipe (with amount)
//! - `IngredientTotal`, a summed line of a shopping list
//! - `Amount`, a positive quantity with at most two decimal places

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Maximum length of an ingredient name
pub const INGREDIENT_NAME_MAX_LEN: usize = 128;

/// Maximum length of a measurement unit
pub const MEASUREMENT_UNIT_MAX_LEN: usize = 64;

/// Ingredient reference entity, bulk-loaded from CSV
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

/// Decimal places an amount may carry
pub const AMOUNT_DECIMAL_PLACES: u32 = 2;

/// Largest storable amount in hundredths (ten digits, two after the point)
pub const MAX_AMOUNT_HUNDREDTHS: i64 = 9_999_999_999;

/// Ingredient quantity, held as a whole number of hundredths.
///
/// Amounts are stored in the database the same way, so sums stay exact on
/// every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    /// Accept a positive value with at most two decimal places and ten digits
    pub fn new(value: Decimal) -> Option<Self> {
        if value <= Decimal::ZERO {
            return None;
        }
        let value = value.normalize();
        if value.scale() > AMOUNT_DECIMAL_PLACES {
            return None;
        }
        let hundredths = value.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()?;
        (hundredths <= MAX_AMOUNT_HUNDREDTHS).then_some(Self(hundredths))
    }

    /// Wrap a stored hundredths count (column values and their sums)
    pub fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    pub fn hundredths(self) -> i64 {
        self.0
    }

    /// The quantity without trailing zeros (`1.50` becomes `1.5`)
    pub fn value(self) -> Decimal {
        Decimal::new(self.0, AMOUNT_DECIMAL_PLACES).normalize()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.value(), serializer)
    }
}

/// Ingredient row joined with the amount a recipe calls for
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecipeIngredient {
    /// Ingredient id (not the join row id)
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: Amount,
}

/// Aggregated amount of one ingredient across a shopping cart
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngredientTotal {
    pub name: String,
    pub measurement_unit: String,
    pub total: Amount,
}

/// Ingredient reference submitted with a recipe
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct IngredientAmount {
    /// Ingredient id
    pub id: i64,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_amount_accepts_two_decimal_places() {
        assert_eq!(Amount::new(dec("0.5")).map(Amount::hundredths), Some(50));
        assert_eq!(Amount::new(dec("1.25")).map(Amount::hundredths), Some(125));
        assert_eq!(Amount::new(dec("3.100")).map(Amount::hundredths), Some(310));
        assert_eq!(Amount::new(dec("150")).map(Amount::hundredths), Some(15000));
    }

    #[test]
    fn test_amount_rejects_invalid_values() {
        assert_eq!(Amount::new(Decimal::ZERO), None);
        assert_eq!(Amount::new(dec("-1")), None);
        assert_eq!(Amount::new(dec("0.125")), None);
        assert_eq!(Amount::new(dec("100000000")), None);
        assert!(Amount::new(dec("99999999.99")).is_some());
    }

    #[test]
    fn test_amount_display_drops_trailing_zeros() {
        assert_eq!(Amount::from_hundredths(175).to_string(), "1.75");
        assert_eq!(Amount::from_hundredths(15000).to_string(), "150");
        assert_eq!(Amount::from_hundredths(50).to_string(), "0.5");
    }

    #[test]
    fn test_amount_serializes_as_number() {
        assert_eq!(serde_json::to_value(Amount::from_hundredths(50)).unwrap(), serde_json::json!(0.5));
        assert_eq!(serde_json::to_value(Amount::from_hundredths(200)).unwrap(), serde_json::json!(2.0));
    }
}
