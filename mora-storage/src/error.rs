//! Storage error types.

use std::io;
use thiserror::Error;

/// Storage operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error during storage operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Key not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Key that cannot be mapped onto the backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Object store error
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key material or ciphertext problem
    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
            || matches!(self, StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound)
            || matches!(
                self,
                StorageError::ObjectStore(object_store::Error::NotFound { .. })
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(StorageError::NotFound("images/a.png".into()).is_not_found());

        let io_err = StorageError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(io_err.is_not_found());

        assert!(!StorageError::Encryption("bad".into()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound("images/scan.png".to_string());
        assert_eq!(err.to_string(), "Object not found: images/scan.png");
    }
}
