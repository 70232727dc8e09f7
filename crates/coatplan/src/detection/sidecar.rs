use std::sync::Arc;

use crate::model::Artifact;
use crate::storage::ObjectStorage;

use super::{DetectionError, RawObservation, SurfaceDetector};

/// Reads detections produced out-of-band by an external detector.
///
/// The detector drops `<storage_key>.surfaces.json` next to the blueprint;
/// until it exists the detector is considered unavailable and the job retries.
pub struct SidecarDetector {
    storage: Arc<dyn ObjectStorage>,
}

impl SidecarDetector {
    pub const SUFFIX: &'static str = ".surfaces.json";

    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub fn sidecar_key(storage_key: &str) -> String {
        format!("{}{}", storage_key, Self::SUFFIX)
    }
}

impl SurfaceDetector for SidecarDetector {
    fn detect(&self, artifact: &Artifact) -> Result<Vec<RawObservation>, DetectionError> {
        let key = Self::sidecar_key(&artifact.storage_key);
        let bytes = match self.storage.get_object(&key) {
            Ok(bytes) => bytes,
            Err(crate::error::StorageError::ObjectNotFound(_)) => {
                return Err(DetectionError::Unavailable(format!(
                    "no detection output for artifact {}",
                    artifact.id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let observations: Vec<RawObservation> = serde_json::from_slice(&bytes)
            .map_err(|e| DetectionError::Malformed(e.to_string()))?;
        for observation in &observations {
            observation.validate()?;
        }
        Ok(observations)
    }
}
