use serde::{Deserialize, Serialize};

use crate::model::{CostEstimates, PreparationStep};

pub const DEFAULT_LABOR_RATE: f64 = 45.0;

/// Pricing inputs for cost aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRates {
    /// Currency units per labor hour.
    #[serde(default = "default_labor_rate")]
    pub labor_rate: f64,
}

fn default_labor_rate() -> f64 {
    DEFAULT_LABOR_RATE
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            labor_rate: DEFAULT_LABOR_RATE,
        }
    }
}

/// Aggregates a preparation plan into cost estimates.
///
/// Material quantities are summed as raw numbers regardless of unit.
pub fn estimate(steps: &[PreparationStep], rates: &CostRates) -> CostEstimates {
    let labor_hours: f64 = steps.iter().map(|s| s.estimated_time).sum();
    let material_cost: f64 = steps
        .iter()
        .map(|s| s.materials.iter().map(|m| m.quantity).sum::<f64>())
        .sum();
    let preparation_cost = labor_hours * rates.labor_rate;

    CostEstimates {
        labor_hours,
        material_cost,
        preparation_cost,
        total_cost: preparation_cost + material_cost,
    }
}
