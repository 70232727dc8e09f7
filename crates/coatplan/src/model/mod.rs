pub mod artifact;
pub mod surface;

pub use artifact::{
    AnalysisStatus, AnalysisSummary, Artifact, DocumentMetadata, MimeKind, PageDimensions,
    UploadStatus, VirusScanResult, VirusScanStatus,
};
pub use surface::{
    AdjacentArea, Condition, CostEstimates, Material, MaterialRequirement, PreparationKind,
    PreparationStep, RelationshipType, Surface, SurfaceDimensions, SurfaceLocation, SurfaceStatus,
    SurfaceType, TreatmentType,
};
