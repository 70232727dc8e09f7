//! Surface: one physical area on a blueprint requiring a coating treatment.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::cost::{self, CostRates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceType {
    Standard,
    CmuBlock,
    Masonry,
    Special,
}

/// Substrate material. Unknown materials are kept verbatim so they can be
/// reported back, and map to a custom treatment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Material {
    Concrete,
    Brick,
    Cmu,
    Drywall,
    Plaster,
    Wood,
    Metal,
    Other(String),
}

impl Material {
    pub fn as_str(&self) -> &str {
        match self {
            Material::Concrete => "concrete",
            Material::Brick => "brick",
            Material::Cmu => "cmu",
            Material::Drywall => "drywall",
            Material::Plaster => "plaster",
            Material::Wood => "wood",
            Material::Metal => "metal",
            Material::Other(name) => name,
        }
    }
}

impl From<String> for Material {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "concrete" => Material::Concrete,
            "brick" => Material::Brick,
            "cmu" => Material::Cmu,
            "drywall" => Material::Drywall,
            "plaster" => Material::Plaster,
            "wood" => Material::Wood,
            "metal" => Material::Metal,
            _ => Material::Other(value),
        }
    }
}

impl From<Material> for String {
    fn from(value: Material) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentType {
    MasonryPrimer,
    Primer,
    WoodPrimer,
    MetalPrimer,
    Custom,
}

impl TreatmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            TreatmentType::MasonryPrimer => "masonry_primer",
            TreatmentType::Primer => "primer",
            TreatmentType::WoodPrimer => "wood_primer",
            TreatmentType::MetalPrimer => "metal_primer",
            TreatmentType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Adjacent,
    Above,
    Below,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceStatus {
    Detected,
    Analyzed,
    Verified,
    InProgress,
    Completed,
}

impl SurfaceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceStatus::Detected => "detected",
            SurfaceStatus::Analyzed => "analyzed",
            SurfaceStatus::Verified => "verified",
            SurfaceStatus::InProgress => "in_progress",
            SurfaceStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detected" => Some(SurfaceStatus::Detected),
            "analyzed" => Some(SurfaceStatus::Analyzed),
            "verified" => Some(SurfaceStatus::Verified),
            "in_progress" => Some(SurfaceStatus::InProgress),
            "completed" => Some(SurfaceStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceDimensions {
    pub width: f64,
    pub height: f64,
    pub area: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "ft".to_string()
}

impl SurfaceDimensions {
    /// Builds dimensions, deriving `area = width × height` when no area was measured.
    pub fn resolve(width: f64, height: f64, area: Option<f64>, unit: Option<&str>) -> Self {
        Self {
            width,
            height,
            area: area.unwrap_or(width * height),
            unit: unit.map(str::to_string).unwrap_or_else(default_unit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceLocation {
    pub floor: i32,
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequirement {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationKind {
    Cleaning,
    Sanding,
    Patching,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationStep {
    #[serde(rename = "type")]
    pub kind: PreparationKind,
    pub description: String,
    /// Hours.
    pub estimated_time: f64,
    pub materials: Vec<MaterialRequirement>,
}

/// Always derived from the preparation plan; never user-supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimates {
    pub labor_hours: f64,
    pub material_cost: f64,
    pub preparation_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjacentArea {
    pub area_number: String,
    pub relationship_type: RelationshipType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub id: String,
    pub project_id: String,
    pub artifact_id: String,
    pub generation_id: String,
    pub area_number: String,
    pub surface_type: SurfaceType,
    pub material: Material,
    pub condition: Condition,
    pub dimensions: SurfaceDimensions,
    pub location: SurfaceLocation,
    pub treatment_type: TreatmentType,
    pub surface_preparation: Vec<PreparationStep>,
    pub cost_estimates: CostEstimates,
    pub analysis_confidence: f64,
    pub adjacent_areas: Vec<AdjacentArea>,
    pub status: SurfaceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Surface {
    /// Records an adjacency edge on this side only. Returns `false` when
    /// `area_number` was already linked (compared by area number).
    pub fn add_adjacent_area(&mut self, area_number: &str, relationship: RelationshipType) -> bool {
        if area_number == self.area_number
            || self
                .adjacent_areas
                .iter()
                .any(|a| a.area_number == area_number)
        {
            return false;
        }
        self.adjacent_areas.push(AdjacentArea {
            area_number: area_number.to_string(),
            relationship_type: relationship,
        });
        true
    }

    /// Recomputes `cost_estimates` from the preparation plan.
    pub fn update_cost_estimates(&mut self, rates: &CostRates) {
        self.cost_estimates = cost::estimate(&self.surface_preparation, rates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_is_derived_when_absent() {
        let dims = SurfaceDimensions::resolve(10.0, 8.0, None, None);
        assert_eq!(dims.area, 80.0);
        assert_eq!(dims.unit, "ft");
    }

    #[test]
    fn test_measured_area_is_kept() {
        let dims = SurfaceDimensions::resolve(10.0, 8.0, Some(72.5), Some("m"));
        assert_eq!(dims.area, 72.5);
        assert_eq!(dims.unit, "m");
    }

    #[test]
    fn test_material_parses_known_and_keeps_unknown() {
        assert_eq!(Material::from("Concrete".to_string()), Material::Concrete);
        assert_eq!(Material::from("cmu".to_string()), Material::Cmu);
        let glass = Material::from("glass".to_string());
        assert_eq!(glass, Material::Other("glass".to_string()));
        assert_eq!(glass.as_str(), "glass");
    }

    #[test]
    fn test_material_serde_uses_plain_strings() {
        let json = serde_json::to_string(&Material::Drywall).unwrap();
        assert_eq!(json, "\"drywall\"");
        let parsed: Material = serde_json::from_str("\"stucco\"").unwrap();
        assert_eq!(parsed, Material::Other("stucco".to_string()));
    }

    #[test]
    fn test_preparation_step_serializes_type_field() {
        let step = PreparationStep {
            kind: PreparationKind::Cleaning,
            description: "General surface cleaning".to_string(),
            estimated_time: 1.0,
            materials: vec![],
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "cleaning");
        assert_eq!(json["estimatedTime"], 1.0);
    }

    #[test]
    fn test_surface_status_strings() {
        assert_eq!(SurfaceStatus::parse("in_progress"), Some(SurfaceStatus::InProgress));
        assert_eq!(SurfaceStatus::Analyzed.as_str(), "analyzed");
        assert_eq!(SurfaceStatus::parse("done"), None);
    }
}
