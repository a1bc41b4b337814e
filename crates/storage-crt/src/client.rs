//! AWS SDK S3 object store implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use s3_offload_storage::{ObjectStore, OffloadSettings, StorageError};

use crate::error::CrtError;

/// ObjectStore implementation using the AWS SDK for Rust.
///
/// The SDK handles request signing, retries with backoff and connection
/// pooling. Files are streamed from disk rather than buffered in memory.
pub struct S3ObjectStore {
    /// The underlying S3 client.
    s3_client: S3Client,
    /// Bucket, prefix and URL configuration.
    settings: OffloadSettings,
}

impl S3ObjectStore {
    /// Create a new store with the default credential chain unless static
    /// credentials are configured.
    ///
    /// # Arguments
    /// * `settings` - Bucket, region, endpoint and optional credentials
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the settings fail validation.
    pub async fn new(settings: OffloadSettings) -> Result<Self, StorageError> {
        settings.validate()?;

        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()));

        let config_loader = if let Some(ref creds) = settings.credentials {
            let credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "s3-offload",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style || settings.endpoint.is_some());
        if let Some(ref endpoint) = settings.endpoint {
            s3_config = s3_config.endpoint_url(endpoint);
        }
        let s3_client = S3Client::from_conf(s3_config.build());

        log::info!(
            "Object store ready: bucket={} region={} endpoint={}",
            settings.bucket,
            settings.region,
            settings.endpoint.as_deref().unwrap_or("aws")
        );

        Ok(Self {
            s3_client,
            settings,
        })
    }

    /// Create a store from an existing S3Client (for testing).
    ///
    /// # Arguments
    /// * `s3_client` - Pre-configured S3 client
    /// * `settings` - Bucket and URL configuration
    pub fn from_client(s3_client: S3Client, settings: OffloadSettings) -> Self {
        Self {
            s3_client,
            settings,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.settings.bucket
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<String, StorageError> {
        let body = ByteStream::from_path(path).await.map_err(|e| {
            StorageError::from(CrtError::IoError {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })?;

        let mut request = self
            .s3_client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .body(body);

        if let Some(content_type) = mime_guess::from_path(path).first_raw() {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|err| sdk_error(err).into_storage_error(&self.settings.bucket, key))?;

        log::debug!("Uploaded {} to s3://{}/{}", path.display(), self.settings.bucket, key);
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.s3_client
            .delete_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| sdk_error(err).into_storage_error(&self.settings.bucket, key))?;
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        self.settings.object_url(key)
    }
}

/// Flatten an SDK error into a `CrtError`, keeping the service error code.
fn sdk_error<E, R>(err: SdkError<E, R>) -> CrtError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code: Option<String> = err
        .as_service_error()
        .and_then(|e: &E| e.code())
        .map(str::to_string);
    let retryable: bool = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    );
    CrtError::SdkError {
        message: DisplayErrorContext(&err).to_string(),
        code,
        retryable,
    }
}
