//! Upload intake: the work between "bytes landed" and "ready for analysis".
//!
//! Content sniffing, malware scanning and metadata probing. Storage reads and
//! record updates are driven by the analysis worker; this module only looks
//! at bytes.

pub mod probe;
pub mod scanner;

use thiserror::Error;

use crate::model::MimeKind;

pub use probe::probe_metadata;
pub use scanner::{MalwareScanner, NoopScanner, ScanVerdict};

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Declared type '{declared}' does not match content ({detected})")]
    ContentMismatch { declared: String, detected: String },

    #[error("Failed to read document metadata: {0}")]
    Probe(String),

    #[error("Malware scanner failed: {0}")]
    Scanner(String),
}

/// Sniffs the document format from magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<MimeKind> {
    infer::get(bytes).and_then(|t| MimeKind::from_mime(t.mime_type()))
}

/// Confirms the bytes are what the uploader declared.
pub fn verify_content_type(declared: MimeKind, bytes: &[u8]) -> Result<(), IntakeError> {
    match sniff(bytes) {
        Some(detected) if detected == declared => Ok(()),
        Some(detected) => Err(IntakeError::ContentMismatch {
            declared: declared.mime_type().to_string(),
            detected: detected.mime_type().to_string(),
        }),
        None => Err(IntakeError::ContentMismatch {
            declared: declared.mime_type().to_string(),
            detected: infer::get(bytes)
                .map(|t| t.mime_type().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }),
    }
}
