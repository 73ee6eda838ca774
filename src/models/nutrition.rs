// src/models/nutrition.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::units::Unit;

/// One recipe line joined with the catalogue data it needs for the rollup.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: Unit,
    pub base_quantity: f64,
    pub base_unit: Unit,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub prices: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncompatibleUnit {
    pub ingredient_name: String,
    pub unit: Unit,
    pub base_unit: Unit,
}

impl std::fmt::Display for IncompatibleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' is measured in {}, it cannot be given in {}",
            self.ingredient_name,
            self.base_unit.as_str(),
            self.unit.as_str()
        )
    }
}

impl PricedLine {
    /// How many base quantities of the ingredient this line uses.
    pub fn factor(&self) -> Result<f64, IncompatibleUnit> {
        let in_base = self
            .unit
            .convert(self.quantity, self.base_unit)
            .ok_or_else(|| IncompatibleUnit {
                ingredient_name: self.ingredient_name.clone(),
                unit: self.unit,
                base_unit: self.base_unit,
            })?;
        Ok(in_base / self.base_quantity)
    }

    fn cheapest_price(&self) -> f64 {
        self.prices
            .values()
            .copied()
            .fold(None, |best: Option<f64>, price| {
                Some(best.map_or(price, |b| b.min(price)))
            })
            .unwrap_or(0.0)
    }
}

/// Per-serving values stored on the recipe row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RecipeTotals {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub cost_per_serving: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl RecipeTotals {
    /// Sums every line's contribution and divides by the number of servings.
    /// Each line is costed at the cheapest market that stocks it.
    pub fn compute(lines: &[PricedLine], servings: i64) -> Result<Self, IncompatibleUnit> {
        let servings = servings.max(1) as f64;
        let mut totals = RecipeTotals::default();

        for line in lines {
            let factor = line.factor()?;
            totals.calories += factor * line.calories;
            totals.protein += factor * line.protein;
            totals.fat += factor * line.fat;
            totals.carbs += factor * line.carbs;
            totals.cost_per_serving += factor * line.cheapest_price();
        }

        Ok(RecipeTotals {
            calories: round2(totals.calories / servings),
            protein: round2(totals.protein / servings),
            fat: round2(totals.fat / servings),
            carbs: round2(totals.carbs / servings),
            cost_per_serving: round2(totals.cost_per_serving / servings),
        })
    }
}

/// Cost of a recipe if everything were bought at one market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketCost {
    pub market: String,
    pub cost_per_serving: f64,
    /// False when some ingredient has no price at this market; the cost then
    /// only covers the ingredients that do.
    pub complete: bool,
    pub missing: Vec<String>,
}

/// Per-market breakdown over every market any line is priced at.
pub fn market_costs(lines: &[PricedLine], servings: i64) -> Result<Vec<MarketCost>, IncompatibleUnit> {
    let servings = servings.max(1) as f64;
    let markets: BTreeSet<&String> = lines.iter().flat_map(|line| line.prices.keys()).collect();

    let mut factors = Vec::with_capacity(lines.len());
    for line in lines {
        factors.push(line.factor()?);
    }

    Ok(markets
        .into_iter()
        .map(|market| {
            let mut total = 0.0;
            let mut missing = Vec::new();
            for (line, factor) in lines.iter().zip(&factors) {
                match line.prices.get(market) {
                    Some(price) => total += factor * price,
                    None => missing.push(line.ingredient_name.clone()),
                }
            }
            MarketCost {
                market: market.clone(),
                cost_per_serving: round2(total / servings),
                complete: missing.is_empty(),
                missing,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, quantity: f64, unit: Unit, prices: &[(&str, f64)]) -> PricedLine {
        PricedLine {
            ingredient_name: name.to_string(),
            quantity,
            unit,
            base_quantity: 100.0,
            base_unit: Unit::G,
            calories: 200.0,
            protein: 10.0,
            fat: 5.0,
            carbs: 30.0,
            prices: prices.iter().map(|(m, p)| (m.to_string(), *p)).collect(),
        }
    }

    #[test]
    fn totals_scale_by_quantity_and_servings() {
        let lines = vec![
            line("rice", 300.0, Unit::G, &[("A", 2.0), ("B", 1.5)]),
            line("lentils", 0.1, Unit::Kg, &[("A", 4.0)]),
        ];
        let totals = RecipeTotals::compute(&lines, 2).unwrap();

        // 3 + 1 base quantities of 200 kcal over 2 servings
        assert_eq!(totals.calories, 400.0);
        assert_eq!(totals.protein, 20.0);
        assert_eq!(totals.fat, 10.0);
        assert_eq!(totals.carbs, 60.0);
        // rice at 1.5 (cheapest) x3, lentils at 4.0 x1, halved
        assert_eq!(totals.cost_per_serving, 4.25);
    }

    #[test]
    fn unpriced_ingredients_cost_nothing() {
        let lines = vec![line("salt", 5.0, Unit::G, &[])];
        let totals = RecipeTotals::compute(&lines, 1).unwrap();
        assert_eq!(totals.cost_per_serving, 0.0);
        assert_eq!(totals.calories, 10.0);
    }

    #[test]
    fn empty_recipe_has_zero_totals() {
        assert_eq!(RecipeTotals::compute(&[], 4).unwrap(), RecipeTotals::default());
    }

    #[test]
    fn wrong_dimension_is_reported_by_name() {
        let lines = vec![line("flour", 2.0, Unit::Cup, &[])];
        let err = RecipeTotals::compute(&lines, 1).unwrap_err();
        assert_eq!(err.ingredient_name, "flour");
        assert!(err.to_string().contains("cup"));
    }

    #[test]
    fn market_breakdown_flags_missing_prices() {
        let lines = vec![
            line("rice", 200.0, Unit::G, &[("A", 2.0), ("B", 1.0)]),
            line("beans", 100.0, Unit::G, &[("A", 3.0)]),
        ];
        let costs = market_costs(&lines, 1).unwrap();

        assert_eq!(costs.len(), 2);
        assert_eq!(costs[0].market, "A");
        assert_eq!(costs[0].cost_per_serving, 7.0);
        assert!(costs[0].complete);
        assert_eq!(costs[1].market, "B");
        assert_eq!(costs[1].cost_per_serving, 2.0);
        assert_eq!(costs[1].missing, vec!["beans".to_string()]);
    }
}
