//! Artifact record: one uploaded blueprint and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the bytes exist in storage and passed intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UploadStatus::Pending),
            "processing" => Some(UploadStatus::Processing),
            "completed" => Some(UploadStatus::Completed),
            "failed" => Some(UploadStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, to: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                // compensation when the enqueue after confirm fails
                | (Processing, Pending)
        )
    }
}

/// Whether derived surfaces exist and are trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::InProgress => "in_progress",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "in_progress" => Some(AnalysisStatus::InProgress),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

/// Independent scan lifecycle gating analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirusScanStatus {
    Pending,
    Scanning,
    Clean,
    Infected,
}

impl VirusScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VirusScanStatus::Pending => "pending",
            VirusScanStatus::Scanning => "scanning",
            VirusScanStatus::Clean => "clean",
            VirusScanStatus::Infected => "infected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VirusScanStatus::Pending),
            "scanning" => Some(VirusScanStatus::Scanning),
            "clean" => Some(VirusScanStatus::Clean),
            "infected" => Some(VirusScanStatus::Infected),
            _ => None,
        }
    }
}

/// Document formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeKind {
    Jpeg,
    Png,
    Tiff,
    Pdf,
    Webp,
}

impl MimeKind {
    pub const ALL: [MimeKind; 5] = [
        MimeKind::Jpeg,
        MimeKind::Png,
        MimeKind::Tiff,
        MimeKind::Pdf,
        MimeKind::Webp,
    ];

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" => Some(MimeKind::Jpeg),
            "image/png" => Some(MimeKind::Png),
            "image/tiff" => Some(MimeKind::Tiff),
            "application/pdf" => Some(MimeKind::Pdf),
            "image/webp" => Some(MimeKind::Webp),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MimeKind::Jpeg => "image/jpeg",
            MimeKind::Png => "image/png",
            MimeKind::Tiff => "image/tiff",
            MimeKind::Pdf => "application/pdf",
            MimeKind::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MimeKind::Jpeg => "jpeg",
            MimeKind::Png => "png",
            MimeKind::Tiff => "tiff",
            MimeKind::Pdf => "pdf",
            MimeKind::Webp => "webp",
        }
    }

    pub fn is_raster(self) -> bool {
        !matches!(self, MimeKind::Pdf)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDimensions {
    pub width: f64,
    pub height: f64,
    /// "px" for raster images, "pt" for PDF pages.
    pub unit: String,
}

/// Populated only after intake succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<PageDimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_dpi: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirusScanResult {
    pub scanned_at: DateTime<Utc>,
    pub is_clean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_details: Option<String>,
}

/// Aggregate over the attached surface generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_area: f64,
    pub surface_count: u32,
    pub detected_materials: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub owner_id: String,
    pub project_id: String,
    pub storage_key: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub upload_status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    pub analysis_status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    pub virus_scan_status: VirusScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virus_scan_result: Option<VirusScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_results: Option<AnalysisSummary>,
    /// References into the surfaces table; surfaces are the authoritative copies.
    pub surface_ids: Vec<String>,
    /// Generation whose surfaces are currently attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_generation: Option<String>,
    /// Last job enqueued for this artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// A fresh record at upload initiation.
    pub fn new_pending(
        owner_id: &str,
        project_id: &str,
        storage_key: &str,
        original_name: &str,
        kind: MimeKind,
        file_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            project_id: project_id.to_string(),
            storage_key: storage_key.to_string(),
            original_name: original_name.to_string(),
            mime_type: kind.mime_type().to_string(),
            file_size,
            upload_status: UploadStatus::Pending,
            processing_error: None,
            analysis_status: AnalysisStatus::Pending,
            analysis_error: None,
            virus_scan_status: VirusScanStatus::Pending,
            virus_scan_result: None,
            metadata: None,
            analysis_results: None,
            surface_ids: Vec::new(),
            surface_generation: None,
            job_id: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn mime_kind(&self) -> Option<MimeKind> {
        MimeKind::from_mime(&self.mime_type)
    }

    /// Returns the reason analysis may not start, if any.
    ///
    /// `analysis_status` only leaves `pending` once the upload is completed,
    /// and never for a document that failed or has not finished its scan.
    pub fn analysis_gate(&self) -> Option<String> {
        if self.upload_status != UploadStatus::Completed {
            return Some(format!(
                "upload status is '{}', expected 'completed'",
                self.upload_status.as_str()
            ));
        }
        if self.virus_scan_status != VirusScanStatus::Clean {
            return Some(format!(
                "virus scan status is '{}', expected 'clean'",
                self.virus_scan_status.as_str()
            ));
        }
        None
    }
}
