// src/models/recipe.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{rating::RunningAverage, units::Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}

/// Represents the 'recipes' table, joined with the author's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub author_username: String,
    pub name: String,
    pub steps: Json<Vec<String>>,
    pub prep_time: i64,
    pub cook_time: i64,
    pub meal_type: MealType,
    pub servings: i64,

    /// Per serving, rolled up from the ingredient lines.
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub cost_per_serving: f64,

    pub taste_rating: f64,
    pub taste_rating_count: i64,
    pub difficulty_rating: f64,
    pub difficulty_rating_count: i64,
    pub health_rating: f64,
    pub health_rating_count: i64,

    pub like_count: i64,
    pub bookmark_count: i64,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Column list matching `Recipe`, for `FROM recipes r JOIN users u`.
pub const RECIPE_COLUMNS: &str = r#"
    r.id, r.user_id, u.username AS author_username, r.name, r.steps,
    r.prep_time, r.cook_time, r.meal_type, r.servings,
    r.calories, r.protein, r.fat, r.carbs, r.cost_per_serving,
    r.taste_rating, r.taste_rating_count,
    r.difficulty_rating, r.difficulty_rating_count,
    r.health_rating, r.health_rating_count,
    r.like_count, r.bookmark_count, r.created_at, r.updated_at
"#;

/// The three running averages of one recipe, read under the write lock.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct RecipeRatingState {
    pub taste_rating: f64,
    pub taste_rating_count: i64,
    pub difficulty_rating: f64,
    pub difficulty_rating_count: i64,
    pub health_rating: f64,
    pub health_rating_count: i64,
}

impl RecipeRatingState {
    pub fn taste(&self) -> RunningAverage {
        RunningAverage::new(self.taste_rating, self.taste_rating_count)
    }

    pub fn difficulty(&self) -> RunningAverage {
        RunningAverage::new(self.difficulty_rating, self.difficulty_rating_count)
    }

    pub fn health(&self) -> RunningAverage {
        RunningAverage::new(self.health_rating, self.health_rating_count)
    }
}

/// One ingredient line as shown on a recipe.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecipeIngredientLine {
    pub ingredient_id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: Unit,
    pub allergens: Json<Vec<String>>,
    pub dietary_info: Json<Vec<String>>,
}

/// Recipe plus its ingredient lines and the union of their allergens.
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredientLine>,
    pub allergens: Vec<String>,
}

impl RecipeDetail {
    pub fn new(recipe: Recipe, ingredients: Vec<RecipeIngredientLine>) -> Self {
        let mut allergens: Vec<String> = ingredients
            .iter()
            .flat_map(|line| line.allergens.0.iter().cloned())
            .collect();
        allergens.sort();
        allergens.dedup();
        Self {
            recipe,
            ingredients,
            allergens,
        }
    }
}

/// DTO for one line of a recipe.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct IngredientLineRequest {
    pub ingredient_id: i64,
    #[validate(range(exclusive_min = 0.0, max = 100000.0, message = "Quantity must be positive"))]
    pub quantity: f64,
    pub unit: Unit,
}

fn validate_steps(steps: &[String]) -> Result<(), validator::ValidationError> {
    if steps.is_empty() || steps.len() > 100 {
        return Err(validator::ValidationError::new("steps_count_out_of_range"));
    }
    for step in steps {
        if step.trim().is_empty() || step.len() > 2000 {
            return Err(validator::ValidationError::new("invalid_step"));
        }
    }
    Ok(())
}

fn validate_lines(lines: &[IngredientLineRequest]) -> Result<(), validator::ValidationError> {
    if lines.len() > 100 {
        return Err(validator::ValidationError::new("too_many_ingredients"));
    }
    let mut seen = std::collections::HashSet::new();
    for line in lines {
        if !seen.insert(line.ingredient_id) {
            return Err(validator::ValidationError::new("duplicate_ingredient"));
        }
        line.validate()
            .map_err(|_| validator::ValidationError::new("invalid_ingredient_line"))?;
    }
    Ok(())
}

fn default_servings() -> i64 {
    1
}

/// DTO for creating a recipe.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRecipeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom(function = validate_steps))]
    pub steps: Vec<String>,
    #[validate(range(min = 0, max = 10000))]
    pub prep_time: i64,
    #[validate(range(min = 0, max = 10000))]
    pub cook_time: i64,
    pub meal_type: MealType,
    #[serde(default = "default_servings")]
    #[validate(range(min = 1, max = 100))]
    pub servings: i64,
    #[serde(default)]
    #[validate(custom(function = validate_lines))]
    pub ingredients: Vec<IngredientLineRequest>,
}

/// DTO for editing a recipe. `ingredients`, when given, replaces every line.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecipeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub steps: Option<Vec<String>>,
    #[validate(range(min = 0, max = 10000))]
    pub prep_time: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub cook_time: Option<i64>,
    pub meal_type: Option<MealType>,
    #[validate(range(min = 1, max = 100))]
    pub servings: Option<i64>,
    pub ingredients: Option<Vec<IngredientLineRequest>>,
}

impl UpdateRecipeRequest {
    /// Checks the list fields, which the derive cannot reach through `Option`.
    pub fn validate_lists(&self) -> Result<(), validator::ValidationError> {
        if let Some(steps) = &self.steps {
            validate_steps(steps)?;
        }
        if let Some(lines) = &self.ingredients {
            validate_lines(lines)?;
        }
        Ok(())
    }
}

/// Query parameters for listing recipes.
#[derive(Debug, Deserialize)]
pub struct RecipeListParams {
    /// Id of the last recipe of the previous page.
    pub cursor: Option<i64>,
    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
    /// Name search.
    pub q: Option<String>,
    pub meal_type: Option<MealType>,
    pub user_id: Option<i64>,
    /// 'new' (default) or 'top' (by taste rating, then likes).
    pub sort: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i64, quantity: f64) -> IngredientLineRequest {
        IngredientLineRequest {
            ingredient_id: id,
            quantity,
            unit: Unit::G,
        }
    }

    #[test]
    fn duplicate_and_non_positive_lines_are_rejected() {
        assert!(validate_lines(&[line(1, 10.0), line(2, 5.0)]).is_ok());
        assert!(validate_lines(&[line(1, 10.0), line(1, 5.0)]).is_err());
        assert!(validate_lines(&[line(1, 0.0)]).is_err());
    }

    #[test]
    fn recipe_needs_at_least_one_step() {
        assert!(validate_steps(&[]).is_err());
        assert!(validate_steps(&["   ".to_string()]).is_err());
        assert!(validate_steps(&["Chop the onions".to_string()]).is_ok());
    }

    #[test]
    fn servings_default_to_one() {
        let req: CreateRecipeRequest = serde_json::from_value(serde_json::json!({
            "name": "Menemen",
            "steps": ["Scramble eggs with tomatoes"],
            "prep_time": 5,
            "cook_time": 10,
            "meal_type": "breakfast"
        }))
        .unwrap();
        assert_eq!(req.servings, 1);
        assert!(req.ingredients.is_empty());
        assert!(req.validate().is_ok());
    }
}
