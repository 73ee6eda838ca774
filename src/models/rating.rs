// src/models/rating.rs

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError, ValidationErrors};

/// Stored mean plus sample count. Individual samples live in their own
/// tables, the recipe only keeps this pair per rating kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunningAverage {
    pub mean: f64,
    pub count: i64,
}

impl RunningAverage {
    pub fn new(mean: f64, count: i64) -> Self {
        Self { mean, count }
    }

    pub fn add(self, value: f64) -> Self {
        let count = self.count + 1;
        Self {
            mean: (self.mean * self.count as f64 + value) / count as f64,
            count,
        }
    }

    /// Removes one sample. The last sample leaves a zero mean behind.
    pub fn drop(self, value: f64) -> Self {
        if self.count <= 1 {
            return Self::default();
        }
        let count = self.count - 1;
        Self {
            mean: (self.mean * self.count as f64 - value) / count as f64,
            count,
        }
    }

    /// Swaps one sample for another without changing the count.
    pub fn replace(self, old: f64, new: f64) -> Self {
        if self.count == 0 {
            return self.add(new);
        }
        Self {
            mean: self.mean + (new - old) / self.count as f64,
            count: self.count,
        }
    }

    pub fn apply(self, change: RatingChange) -> Self {
        match change {
            RatingChange::Add(value) => self.add(value),
            RatingChange::Drop(value) => self.drop(value),
            RatingChange::Replace { old, new } => self.replace(old, new),
        }
    }
}

/// Which running average on the recipe a rating feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingKind {
    Taste,
    Difficulty,
    Health,
}

impl RatingKind {
    /// (mean column, count column) on `recipes`.
    pub fn columns(self) -> (&'static str, &'static str) {
        match self {
            RatingKind::Taste => ("taste_rating", "taste_rating_count"),
            RatingKind::Difficulty => ("difficulty_rating", "difficulty_rating_count"),
            RatingKind::Health => ("health_rating", "health_rating_count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatingChange {
    Add(f64),
    Drop(f64),
    Replace { old: f64, new: f64 },
}

impl RatingChange {
    /// Works out what an upsert does to one rating field.
    ///
    /// `requested` is `None` when the field was left out of the request
    /// (keep the old value) and `Some(None)` when it was explicitly cleared.
    pub fn between(old: Option<f64>, requested: Option<Option<f64>>) -> Option<RatingChange> {
        let new = match requested {
            None => return None,
            Some(new) => new,
        };
        match (old, new) {
            (None, None) => None,
            (None, Some(new)) => Some(RatingChange::Add(new)),
            (Some(old), None) => Some(RatingChange::Drop(old)),
            (Some(old), Some(new)) if old == new => None,
            (Some(old), Some(new)) => Some(RatingChange::Replace { old, new }),
        }
    }
}

/// Distinguishes "field absent" from "field: null" while deserializing.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

fn score_in_range(value: Option<Option<f64>>) -> bool {
    match value {
        Some(Some(score)) => (0.0..=5.0).contains(&score),
        _ => true,
    }
}

/// Represents the 'recipe_ratings' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecipeRating {
    pub id: i64,
    pub user_id: i64,
    pub recipe_id: i64,
    pub taste_rating: Option<f64>,
    pub difficulty_rating: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for submitting or editing a rating. Both scores are in [0, 5].
#[derive(Debug, Deserialize)]
pub struct RateRecipeRequest {
    #[serde(default, deserialize_with = "explicit_null")]
    pub taste_rating: Option<Option<f64>>,

    #[serde(default, deserialize_with = "explicit_null")]
    pub difficulty_rating: Option<Option<f64>>,
}

impl Validate for RateRecipeRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut failed = false;
        if !score_in_range(self.taste_rating) {
            errors.add("taste_rating", ValidationError::new("rating_out_of_range"));
            failed = true;
        }
        if !score_in_range(self.difficulty_rating) {
            errors.add("difficulty_rating", ValidationError::new("rating_out_of_range"));
            failed = true;
        }
        if failed { Err(errors) } else { Ok(()) }
    }
}

/// Represents the 'health_ratings' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HealthRating {
    pub id: i64,
    pub dietitian_id: i64,
    pub recipe_id: i64,
    pub health_score: f64,
    pub comment: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct HealthRatingRequest {
    #[validate(range(min = 0.0, max = 5.0, message = "Health score must be between 0 and 5"))]
    pub health_score: f64,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn add_keeps_the_mean_of_all_samples() {
        let avg = RunningAverage::default().add(4.0).add(2.0).add(3.0);
        assert_eq!(avg.count, 3);
        assert!(close(avg.mean, 3.0));
    }

    #[test]
    fn drop_reverts_an_add() {
        let before = RunningAverage::default().add(5.0).add(1.0);
        let after = before.add(3.5).drop(3.5);
        assert_eq!(after.count, before.count);
        assert!(close(after.mean, before.mean));
    }

    #[test]
    fn dropping_the_last_sample_zeroes_the_mean() {
        let avg = RunningAverage::new(4.5, 1).drop(4.5);
        assert_eq!(avg, RunningAverage::new(0.0, 0));
        assert_eq!(RunningAverage::default().drop(3.0), RunningAverage::default());
    }

    #[test]
    fn replace_matches_drop_then_add() {
        let avg = RunningAverage::default().add(2.0).add(4.0).add(5.0);
        let replaced = avg.replace(2.0, 5.0);
        let manual = avg.drop(2.0).add(5.0);
        assert_eq!(replaced.count, 3);
        assert!(close(replaced.mean, manual.mean));
        assert!(close(replaced.mean, 14.0 / 3.0));
    }

    #[test]
    fn change_between_old_and_requested_values() {
        assert_eq!(RatingChange::between(Some(3.0), None), None);
        assert_eq!(RatingChange::between(None, Some(Some(4.0))), Some(RatingChange::Add(4.0)));
        assert_eq!(RatingChange::between(Some(4.0), Some(None)), Some(RatingChange::Drop(4.0)));
        assert_eq!(RatingChange::between(Some(4.0), Some(Some(4.0))), None);
        assert_eq!(
            RatingChange::between(Some(1.0), Some(Some(2.0))),
            Some(RatingChange::Replace { old: 1.0, new: 2.0 })
        );
    }

    #[test]
    fn request_tells_missing_from_null() {
        let req: RateRecipeRequest = serde_json::from_str(r#"{"taste_rating": null}"#).unwrap();
        assert_eq!(req.taste_rating, Some(None));
        assert_eq!(req.difficulty_rating, None);
    }

    #[test]
    fn scores_outside_zero_to_five_are_rejected() {
        let req: RateRecipeRequest = serde_json::from_str(r#"{"taste_rating": 5.5}"#).unwrap();
        assert!(req.validate().is_err());
        let req: RateRecipeRequest =
            serde_json::from_str(r#"{"taste_rating": 0, "difficulty_rating": 5}"#).unwrap();
        assert!(req.validate().is_ok());
    }
}
