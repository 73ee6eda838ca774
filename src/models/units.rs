// src/models/units.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Measurement units accepted for ingredient quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Unit {
    Mg,
    G,
    Kg,
    Ml,
    L,
    Tsp,
    Tbsp,
    Cup,
    Pcs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Mg | Unit::G | Unit::Kg => Dimension::Mass,
            Unit::Ml | Unit::L | Unit::Tsp | Unit::Tbsp | Unit::Cup => Dimension::Volume,
            Unit::Pcs => Dimension::Count,
        }
    }

    /// Size of one unit in the canonical unit of its dimension (g, ml, piece).
    fn canonical_factor(self) -> f64 {
        match self {
            Unit::Mg => 0.001,
            Unit::G => 1.0,
            Unit::Kg => 1000.0,
            Unit::Ml => 1.0,
            Unit::L => 1000.0,
            Unit::Tsp => 5.0,
            Unit::Tbsp => 15.0,
            Unit::Cup => 240.0,
            Unit::Pcs => 1.0,
        }
    }

    /// Converts `quantity` of `self` into `target`.
    /// `None` when the two units measure different things.
    pub fn convert(self, quantity: f64, target: Unit) -> Option<f64> {
        if self.dimension() != target.dimension() {
            return None;
        }
        Some(quantity * self.canonical_factor() / target.canonical_factor())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Mg => "mg",
            Unit::G => "g",
            Unit::Kg => "kg",
            Unit::Ml => "ml",
            Unit::L => "l",
            Unit::Tsp => "tsp",
            Unit::Tbsp => "tbsp",
            Unit::Cup => "cup",
            Unit::Pcs => "pcs",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn converts_within_a_dimension() {
        assert!(close(Unit::Kg.convert(1.5, Unit::G).unwrap(), 1500.0));
        assert!(close(Unit::Mg.convert(250.0, Unit::G).unwrap(), 0.25));
        assert!(close(Unit::Cup.convert(1.0, Unit::Tbsp).unwrap(), 16.0));
        assert!(close(Unit::L.convert(0.5, Unit::Ml).unwrap(), 500.0));
        assert!(close(Unit::Pcs.convert(3.0, Unit::Pcs).unwrap(), 3.0));
    }

    #[test]
    fn refuses_cross_dimension_conversion() {
        assert_eq!(Unit::G.convert(100.0, Unit::Ml), None);
        assert_eq!(Unit::Pcs.convert(2.0, Unit::Kg), None);
    }

    #[test]
    fn wire_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&Unit::Tbsp).unwrap(), "\"tbsp\"");
        let unit: Unit = serde_json::from_str("\"kg\"").unwrap();
        assert_eq!(unit, Unit::Kg);
        assert_eq!(unit.as_str(), "kg");
    }
}
