//! Preparation planning rules.
//!
//! Every surface gets a cleaning step. Surfaces in poor condition also get
//! sanding then patching. The order is part of the contract: costs are
//! aggregated step by step in plan order.

use crate::model::{Condition, MaterialRequirement, PreparationKind, PreparationStep};

/// Square feet cleaned per labor hour.
const CLEANING_RATE: f64 = 500.0;
/// Square feet covered per gallon of cleaning solution.
const CLEANING_SOLUTION_COVERAGE: f64 = 400.0;
const SANDING_RATE: f64 = 200.0;
/// Square feet per sheet of sandpaper.
const SANDPAPER_COVERAGE: f64 = 100.0;
const PATCHING_RATE: f64 = 300.0;
/// Square feet per pound of patching compound.
const PATCHING_COMPOUND_COVERAGE: f64 = 200.0;

pub fn plan_preparation(area: f64, condition: Condition) -> Vec<PreparationStep> {
    let mut steps = vec![PreparationStep {
        kind: PreparationKind::Cleaning,
        description: "General surface cleaning".to_string(),
        estimated_time: area / CLEANING_RATE,
        materials: vec![MaterialRequirement {
            name: "cleaning_solution".to_string(),
            quantity: area / CLEANING_SOLUTION_COVERAGE,
            unit: "gallons".to_string(),
        }],
    }];

    if condition == Condition::Poor {
        steps.push(PreparationStep {
            kind: PreparationKind::Sanding,
            description: "Surface sanding for poor condition".to_string(),
            estimated_time: area / SANDING_RATE,
            materials: vec![MaterialRequirement {
                name: "sandpaper".to_string(),
                quantity: (area / SANDPAPER_COVERAGE).ceil(),
                unit: "sheets".to_string(),
            }],
        });
        steps.push(PreparationStep {
            kind: PreparationKind::Patching,
            description: "Patch damaged areas".to_string(),
            estimated_time: area / PATCHING_RATE,
            materials: vec![MaterialRequirement {
                name: "patching_compound".to_string(),
                quantity: area / PATCHING_COMPOUND_COVERAGE,
                unit: "pounds".to_string(),
            }],
        });
    }

    steps
}
