// src/models/ingredient.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::models::units::Unit;

/// Represents the 'ingredients' table in the database.
///
/// Nutrition values and prices are given per `base_quantity` of `base_unit`
/// (e.g. per 100 g).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub allergens: Json<Vec<String>>,
    pub dietary_info: Json<Vec<String>>,
    pub base_quantity: f64,
    pub base_unit: Unit,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    /// Market name → price of one base quantity.
    pub prices: Json<BTreeMap<String, f64>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

fn validate_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Prices must be non-negative and market names non-empty.
fn validate_prices(prices: &BTreeMap<String, f64>) -> Result<(), validator::ValidationError> {
    for (market, price) in prices {
        if market.trim().is_empty() || market.len() > 50 {
            return Err(validator::ValidationError::new("invalid_market_name"));
        }
        if !validate_non_negative(*price) {
            return Err(validator::ValidationError::new("invalid_price"));
        }
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), validator::ValidationError> {
    if tags.len() > 30 {
        return Err(validator::ValidationError::new("too_many_entries"));
    }
    for tag in tags {
        if tag.trim().is_empty() || tag.len() > 50 {
            return Err(validator::ValidationError::new("invalid_entry"));
        }
    }
    Ok(())
}

/// DTO for an admin adding an ingredient to the catalogue.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateIngredientRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[serde(default)]
    #[validate(custom(function = validate_tags))]
    pub allergens: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = validate_tags))]
    pub dietary_info: Vec<String>,
    #[validate(range(exclusive_min = 0.0, max = 100000.0))]
    pub base_quantity: f64,
    pub base_unit: Unit,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub calories: f64,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub protein: f64,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub fat: f64,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub carbs: f64,
    #[serde(default)]
    #[validate(custom(function = validate_prices))]
    pub prices: BTreeMap<String, f64>,
}

/// DTO for editing an ingredient. Absent fields stay untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIngredientRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    pub allergens: Option<Vec<String>>,
    pub dietary_info: Option<Vec<String>>,
    #[validate(range(exclusive_min = 0.0, max = 100000.0))]
    pub base_quantity: Option<f64>,
    pub base_unit: Option<Unit>,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub calories: Option<f64>,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub protein: Option<f64>,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub fat: Option<f64>,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub carbs: Option<f64>,
    pub prices: Option<BTreeMap<String, f64>>,
}

impl UpdateIngredientRequest {
    /// Checks the collection fields, which the derive cannot reach through `Option`.
    pub fn validate_collections(&self) -> Result<(), validator::ValidationError> {
        if let Some(allergens) = &self.allergens {
            validate_tags(allergens)?;
        }
        if let Some(dietary_info) = &self.dietary_info {
            validate_tags(dietary_info)?;
        }
        if let Some(prices) = &self.prices {
            validate_prices(prices)?;
        }
        Ok(())
    }

    /// Whether the change can move nutrition or cost of recipes using it.
    pub fn affects_recipes(&self) -> bool {
        self.base_quantity.is_some()
            || self.base_unit.is_some()
            || self.calories.is_some()
            || self.protein.is_some()
            || self.fat.is_some()
            || self.carbs.is_some()
            || self.prices.is_some()
    }
}

/// Query parameters for browsing the catalogue.
#[derive(Debug, Deserialize)]
pub struct IngredientListParams {
    /// Case-insensitive substring of the name.
    pub q: Option<String>,
    pub category: Option<String>,
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_prices_are_rejected() {
        let mut prices = BTreeMap::new();
        prices.insert("Local Market".to_string(), 12.5);
        assert!(validate_prices(&prices).is_ok());
        prices.insert("Discounter".to_string(), -1.0);
        assert!(validate_prices(&prices).is_err());
    }

    #[test]
    fn update_flags_changes_that_touch_recipes() {
        let rename: UpdateIngredientRequest =
            serde_json::from_value(serde_json::json!({"name": "Brown rice"})).unwrap();
        assert!(!rename.affects_recipes());

        let reprice: UpdateIngredientRequest =
            serde_json::from_value(serde_json::json!({"prices": {"A": 1.0}})).unwrap();
        assert!(reprice.affects_recipes());
    }
}
