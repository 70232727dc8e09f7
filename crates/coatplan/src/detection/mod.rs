//! Surface detection collaborator.
//!
//! The detector itself is external; the pipeline only consumes its output as
//! one atomic list of raw observations per call.

pub mod sidecar;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StorageError;
use crate::model::{Artifact, Condition, Material, SurfaceLocation, SurfaceType};

pub use sidecar::SidecarDetector;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detector unavailable: {0}")]
    Unavailable(String),

    #[error("Detection output is malformed: {0}")]
    Malformed(String),

    #[error("Detector could not read the document: {0}")]
    Storage(#[from] StorageError),
}

/// One raw detection, before treatment and cost derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub area_number: String,
    pub surface_type: SurfaceType,
    pub material: Material,
    pub condition: Condition,
    pub width: f64,
    pub height: f64,
    /// Independently measured area, if the detector supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub location: SurfaceLocation,
    pub confidence: f64,
}

impl RawObservation {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.area_number.trim().is_empty() {
            return Err(DetectionError::Malformed("empty area number".to_string()));
        }
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !finite_non_negative(self.width)
            || !finite_non_negative(self.height)
            || !self.area.map_or(true, finite_non_negative)
        {
            return Err(DetectionError::Malformed(format!(
                "invalid dimensions for area '{}'",
                self.area_number
            )));
        }
        if !self.confidence.is_finite() {
            return Err(DetectionError::Malformed(format!(
                "invalid confidence for area '{}'",
                self.area_number
            )));
        }
        Ok(())
    }
}

pub trait SurfaceDetector: Send + Sync {
    /// An empty result is valid and means "no surfaces".
    fn detect(&self, artifact: &Artifact) -> Result<Vec<RawObservation>, DetectionError>;
}
