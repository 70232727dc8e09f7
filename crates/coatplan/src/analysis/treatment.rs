use crate::model::{Material, TreatmentType};

/// Deterministic material → treatment mapping. Total over `Material`.
pub fn treatment_for(material: &Material) -> TreatmentType {
    match material {
        Material::Concrete | Material::Brick | Material::Cmu => TreatmentType::MasonryPrimer,
        Material::Drywall | Material::Plaster => TreatmentType::Primer,
        Material::Wood => TreatmentType::WoodPrimer,
        Material::Metal => TreatmentType::MetalPrimer,
        Material::Other(_) => TreatmentType::Custom,
    }
}
