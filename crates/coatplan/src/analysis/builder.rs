use chrono::Utc;

use crate::analysis::cost::CostRates;
use crate::analysis::preparation::plan_preparation;
use crate::analysis::treatment::treatment_for;
use crate::detection::RawObservation;
use crate::model::{CostEstimates, Surface, SurfaceDimensions, SurfaceStatus};

/// Classification: resolves dimensions and assigns the treatment.
/// The surface has no preparation plan or costs yet.
pub fn classify(
    observation: &RawObservation,
    project_id: &str,
    artifact_id: &str,
    generation_id: &str,
) -> Surface {
    let dimensions = SurfaceDimensions::resolve(
        observation.width,
        observation.height,
        observation.area,
        observation.unit.as_deref(),
    );
    let now = Utc::now();

    Surface {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        artifact_id: artifact_id.to_string(),
        generation_id: generation_id.to_string(),
        area_number: observation.area_number.clone(),
        surface_type: observation.surface_type,
        material: observation.material.clone(),
        condition: observation.condition,
        treatment_type: treatment_for(&observation.material),
        surface_preparation: Vec::new(),
        dimensions,
        location: observation.location.clone(),
        cost_estimates: CostEstimates::default(),
        analysis_confidence: observation.confidence.clamp(0.0, 1.0),
        adjacent_areas: Vec::new(),
        status: SurfaceStatus::Analyzed,
        last_analyzed_at: Some(now),
        created_at: now,
    }
}

/// Planning: derives the preparation steps from area and condition, then prices them.
pub fn plan(surface: &mut Surface, rates: &CostRates) {
    surface.surface_preparation = plan_preparation(surface.dimensions.area, surface.condition);
    surface.update_cost_estimates(rates);
}

/// Turns one raw observation into an analyzed surface.
///
/// Area is resolved before anything else reads it. Adjacency is left empty
/// for the grouping pass.
pub fn build_surface(
    observation: &RawObservation,
    project_id: &str,
    artifact_id: &str,
    generation_id: &str,
    rates: &CostRates,
) -> Surface {
    let mut surface = classify(observation, project_id, artifact_id, generation_id);
    plan(&mut surface, rates);
    surface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, Material, SurfaceLocation, SurfaceType, TreatmentType};

    fn observation(material: Material, condition: Condition) -> RawObservation {
        RawObservation {
            area_number: "A-101".to_string(),
            surface_type: SurfaceType::Standard,
            material,
            condition,
            width: 10.0,
            height: 8.0,
            area: None,
            unit: None,
            location: SurfaceLocation {
                floor: 1,
                room: "Lobby".to_string(),
                orientation: Some("north".to_string()),
            },
            confidence: 0.87,
        }
    }

    #[test]
    fn test_concrete_surface() {
        let surface = build_surface(
            &observation(Material::Concrete, Condition::Fair),
            "project-1",
            "artifact-1",
            "gen-1",
            &CostRates::default(),
        );
        assert_eq!(surface.dimensions.area, 80.0);
        assert_eq!(surface.treatment_type, TreatmentType::MasonryPrimer);
        assert_eq!(surface.status, SurfaceStatus::Analyzed);
        assert_eq!(surface.surface_preparation.len(), 1);
        assert!(surface.last_analyzed_at.is_some());
        assert!(surface.cost_estimates.total_cost > 0.0);
        assert_eq!(surface.generation_id, "gen-1");
    }

    #[test]
    fn test_classify_leaves_plan_empty() {
        let surface = classify(&observation(Material::Metal, Condition::Poor), "p", "a", "g");
        assert_eq!(surface.treatment_type, TreatmentType::MetalPrimer);
        assert!(surface.surface_preparation.is_empty());
        assert_eq!(surface.cost_estimates, CostEstimates::default());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut raw = observation(Material::Wood, Condition::Good);
        raw.confidence = 1.4;
        let surface = build_surface(&raw, "p", "a", "g", &CostRates::default());
        assert_eq!(surface.analysis_confidence, 1.0);
    }

    #[test]
    fn test_costs_follow_plan() {
        let mut raw = observation(Material::Drywall, Condition::Poor);
        raw.area = Some(500.0);
        let surface = build_surface(&raw, "p", "a", "g", &CostRates::default());
        assert_eq!(surface.dimensions.area, 500.0);
        assert_eq!(surface.surface_preparation.len(), 3);
        let expected_hours = 1.0 + 2.5 + 500.0 / 300.0;
        assert!((surface.cost_estimates.labor_hours - expected_hours).abs() < 1e-9);
    }
}
