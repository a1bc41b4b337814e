//! Offload configuration shared by object store backends.

use serde::{Deserialize, Serialize};

use s3_offload_common::DEFAULT_KEY_PREFIX;

use crate::error::StorageError;

/// Where offloaded files go.
///
/// One canonical contract: a bucket in a region, optionally on an
/// S3-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadSettings {
    /// Destination bucket.
    pub bucket: String,
    /// Bucket region.
    pub region: String,
    /// Key prefix prepended to every root-relative path.
    pub prefix: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, Spaces).
    pub endpoint: Option<String>,
    /// Address buckets by path instead of virtual host.
    pub force_path_style: bool,
    /// Base URL used for public links instead of the bucket URL (e.g. a CDN).
    pub public_url_base: Option<String>,
    /// Static credentials; the default provider chain is used when absent.
    #[serde(skip)]
    pub credentials: Option<AwsCredentials>,
}

impl Default for OffloadSettings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".into(),
            prefix: DEFAULT_KEY_PREFIX.into(),
            endpoint: None,
            force_path_style: false,
            public_url_base: None,
            credentials: None,
        }
    }
}

impl OffloadSettings {
    /// Create settings for a bucket and region with the default prefix.
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            ..Default::default()
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Use an S3-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Serve public links from a different base URL.
    pub fn with_public_url_base(mut self, base: impl Into<String>) -> Self {
        self.public_url_base = Some(base.into());
        self
    }

    /// Use static credentials.
    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Check the settings are usable.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the bucket or region is empty.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.bucket.trim().is_empty() {
            return Err(StorageError::InvalidConfig {
                message: "bucket must not be empty".into(),
            });
        }
        if self.region.trim().is_empty() {
            return Err(StorageError::InvalidConfig {
                message: "region must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Build the public URL of an object.
    ///
    /// # Arguments
    /// * `key` - Object key
    ///
    /// # Returns
    /// `{public_url_base}/{key}` when a base is configured, a path-style URL
    /// on custom endpoints, and the virtual-hosted AWS URL otherwise.
    pub fn object_url(&self, key: &str) -> String {
        let encoded: String = encode_key(key);
        if let Some(base) = &self.public_url_base {
            return format!("{}/{}", base.trim_end_matches('/'), encoded);
        }
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                encoded
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded
            ),
        }
    }
}

/// AWS credentials.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Percent-encode an object key for use in a URL, keeping `/` separators.
fn encode_key(key: &str) -> String {
    let mut encoded: String = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_aws() {
        let settings: OffloadSettings = OffloadSettings::new("media", "eu-west-1");
        assert_eq!(
            settings.object_url("uploads/2024/05/photo.jpg"),
            "https://media.s3.eu-west-1.amazonaws.com/uploads/2024/05/photo.jpg"
        );
    }

    #[test]
    fn test_object_url_custom_endpoint() {
        let settings: OffloadSettings =
            OffloadSettings::new("media", "auto").with_endpoint("http://localhost:9000/");
        assert_eq!(
            settings.object_url("uploads/a.jpg"),
            "http://localhost:9000/media/uploads/a.jpg"
        );
    }

    #[test]
    fn test_object_url_public_base_wins() {
        let settings: OffloadSettings = OffloadSettings::new("media", "us-east-1")
            .with_endpoint("http://localhost:9000")
            .with_public_url_base("https://cdn.example.com/");
        assert_eq!(
            settings.object_url("uploads/a.jpg"),
            "https://cdn.example.com/uploads/a.jpg"
        );
    }

    #[test]
    fn test_object_url_encodes_key() {
        let settings: OffloadSettings = OffloadSettings::new("media", "us-east-1");
        assert_eq!(
            settings.object_url("uploads/my photo+1.jpg"),
            "https://media.s3.us-east-1.amazonaws.com/uploads/my%20photo%2B1.jpg"
        );
    }

    #[test]
    fn test_validate() {
        assert!(OffloadSettings::new("media", "us-east-1").validate().is_ok());
        assert!(matches!(
            OffloadSettings::new("", "us-east-1").validate(),
            Err(StorageError::InvalidConfig { .. })
        ));
        assert!(matches!(
            OffloadSettings::new("media", " ").validate(),
            Err(StorageError::InvalidConfig { .. })
        ));
    }
}
