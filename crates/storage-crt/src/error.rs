//! Error types for the AWS SDK object store.

use s3_offload_storage::StorageError;
use thiserror::Error;

/// Errors specific to the AWS SDK object store.
#[derive(Error, Debug)]
pub enum CrtError {
    /// AWS SDK error.
    #[error("AWS SDK error: {message}")]
    SdkError {
        message: String,
        code: Option<String>,
        retryable: bool,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },
}

impl CrtError {
    /// Convert into a `StorageError` for the object at `bucket`/`key`.
    pub fn into_storage_error(self, bucket: &str, key: &str) -> StorageError {
        match self {
            CrtError::SdkError { code, message, .. }
                if code.as_deref() == Some("AccessDenied") =>
            {
                StorageError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message,
                }
            }
            CrtError::SdkError { code, .. }
                if matches!(code.as_deref(), Some("NoSuchKey") | Some("NoSuchBucket")) =>
            {
                StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            }
            other => other.into(),
        }
    }
}

impl From<CrtError> for StorageError {
    fn from(err: CrtError) -> Self {
        match err {
            CrtError::SdkError {
                message, retryable, ..
            } => StorageError::Service { message, retryable },
            CrtError::ConfigError(message) => StorageError::InvalidConfig { message },
            CrtError::IoError { path, message } => StorageError::IoError { path, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdk_error(code: Option<&str>) -> CrtError {
        CrtError::SdkError {
            message: "boom".into(),
            code: code.map(str::to_string),
            retryable: true,
        }
    }

    #[test]
    fn test_access_denied_mapping() {
        let err: StorageError = sdk_error(Some("AccessDenied")).into_storage_error("media", "a.jpg");
        assert!(matches!(err, StorageError::AccessDenied { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_bucket_mapping() {
        let err: StorageError = sdk_error(Some("NoSuchBucket")).into_storage_error("media", "a.jpg");
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_other_sdk_errors_are_service_errors() {
        let err: StorageError = sdk_error(None).into_storage_error("media", "a.jpg");
        assert!(matches!(err, StorageError::Service { .. }));
        assert!(err.is_retryable());
    }
}
