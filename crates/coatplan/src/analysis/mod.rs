//! Surface model and cost engine.
//!
//! Pure computation with no I/O: raw detections in, priced and grouped
//! surfaces out.

pub mod adjacency;
pub mod builder;
pub mod cost;
pub mod preparation;
pub mod treatment;

use std::collections::HashSet;

pub use adjacency::group_adjacent_surfaces;
pub use builder::{build_surface, classify, plan};
pub use cost::{CostRates, DEFAULT_LABOR_RATE};
pub use preparation::plan_preparation;
pub use treatment::treatment_for;

use crate::detection::RawObservation;
use crate::error::ValidationError;
use crate::model::{AnalysisSummary, Surface};

/// Rejects a detection result that names the same area twice.
pub fn ensure_unique_area_numbers(observations: &[RawObservation]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for observation in observations {
        if !seen.insert(observation.area_number.as_str()) {
            return Err(ValidationError::DuplicateAreaNumber(
                observation.area_number.clone(),
            ));
        }
    }
    Ok(())
}

/// Aggregate numbers stored on the artifact after a successful run.
pub fn summarize(surfaces: &[Surface]) -> AnalysisSummary {
    let total_area = surfaces.iter().map(|s| s.dimensions.area).sum();

    let mut detected_materials: Vec<String> = Vec::new();
    for surface in surfaces {
        let name = surface.material.as_str();
        if !detected_materials.iter().any(|m| m == name) {
            detected_materials.push(name.to_string());
        }
    }

    let confidence = if surfaces.is_empty() {
        0.0
    } else {
        surfaces.iter().map(|s| s.analysis_confidence).sum::<f64>() / surfaces.len() as f64
    };

    AnalysisSummary {
        total_area,
        surface_count: surfaces.len() as u32,
        detected_materials,
        confidence,
    }
}

/// Runs the whole engine over one detection result: build every surface,
/// then group adjacency across the full set. The worker runs the same steps
/// one span at a time.
#[cfg(test)]
pub(crate) fn analyze(
    observations: &[RawObservation],
    project_id: &str,
    artifact_id: &str,
    generation_id: &str,
    rates: &CostRates,
) -> Result<Vec<Surface>, ValidationError> {
    ensure_unique_area_numbers(observations)?;
    let mut surfaces: Vec<Surface> = observations
        .iter()
        .map(|o| build_surface(o, project_id, artifact_id, generation_id, rates))
        .collect();
    group_adjacent_surfaces(&mut surfaces);
    Ok(surfaces)
}
