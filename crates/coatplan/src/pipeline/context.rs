use crate::detection::RawObservation;
use crate::model::{AnalysisSummary, Artifact, Surface};

/// State carried through one analysis run.
pub struct AnalysisContext {
    // Input
    pub artifact: Artifact,
    pub job_id: Option<String>,

    /// Tags every surface written by this run.
    pub generation_id: String,

    // Detection result
    pub observations: Vec<RawObservation>,

    // Classification/planning/grouping result
    pub surfaces: Vec<Surface>,

    // Set just before persisting
    pub summary: Option<AnalysisSummary>,
}

impl AnalysisContext {
    pub fn new(artifact: Artifact, job_id: Option<&str>) -> Self {
        Self {
            artifact,
            job_id: job_id.map(str::to_string),
            generation_id: uuid::Uuid::new_v4().to_string(),
            observations: Vec::new(),
            surfaces: Vec::new(),
            summary: None,
        }
    }
}
