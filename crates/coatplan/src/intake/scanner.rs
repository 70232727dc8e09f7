use super::IntakeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { threat: String },
}

pub trait MalwareScanner: Send + Sync {
    fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, IntakeError>;
}

/// Reports every document as clean. Used where no scanning engine is wired in.
pub struct NoopScanner;

impl MalwareScanner for NoopScanner {
    fn scan(&self, _bytes: &[u8]) -> Result<ScanVerdict, IntakeError> {
        Ok(ScanVerdict::Clean)
    }
}
