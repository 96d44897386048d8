use mora_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid base64 image data: {0}")]
    InvalidBase64(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Too many jobs in progress ({0})")]
    Busy(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    /// Errors caused by the submitted payload rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScanError::InvalidBase64(_) | ScanError::InvalidImage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(ScanError::InvalidBase64("bad".into()).is_client_error());
        assert!(ScanError::InvalidImage("bad".into()).is_client_error());
        assert!(!ScanError::Busy(10).is_client_error());
        assert!(!ScanError::Storage(StorageError::NotFound("x".into())).is_client_error());
    }
}
