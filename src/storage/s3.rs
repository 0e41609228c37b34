//! S3-compatible object store (AWS S3, MinIO, R2)

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use super::backend::{strip_prefix, unquote_etag, ObjectStore};
use crate::config::StoreConfig;
use crate::error::{MirrorError, Result};
use crate::types::FileMap;

/// Error codes S3 and MinIO return for bad or missing credentials
const AUTH_ERROR_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AccessDenied",
    "ExpiredToken",
    "InvalidToken",
];

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];

/// Object store backed by `aws-sdk-s3`
#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Build a client from explicit settings
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the default AWS credential chain applies. A custom endpoint switches on
    /// path-style addressing, which MinIO requires.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(config.operation_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(timeouts);

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => {
                loader = loader.credentials_provider(Credentials::new(
                    id,
                    secret,
                    None,
                    None,
                    "mirrorcast-static",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(MirrorError::Config(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
                ))
            }
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();

        tracing::debug!(
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            region = %config.region,
            "S3 client configured"
        );

        Ok(Self {
            client: S3Client::from_conf(s3_config),
        })
    }

    /// Wrap an existing client
    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

/// Map an SDK failure onto the store error taxonomy
fn classify<E>(operation: &str, bucket: &str, key: &str, err: SdkError<E>) -> MirrorError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_owned);
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = format!("{} s3://{}/{}: {}", operation, bucket, key, DisplayErrorContext(&err));

    let missing_credentials = matches!(
        err,
        SdkError::ConstructionFailure(_) | SdkError::DispatchFailure(_)
    ) && message.to_lowercase().contains("credential");

    if missing_credentials
        || matches!(status, Some(401 | 403))
        || code.as_deref().is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
    {
        return MirrorError::StoreAuth(message);
    }

    if matches!(status, Some(404)) || code.as_deref().is_some_and(|c| NOT_FOUND_CODES.contains(&c))
    {
        return MirrorError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
    }

    MirrorError::StoreUnavailable(message)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("GetObject", bucket, key, e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| MirrorError::StoreUnavailable(format!("reading s3://{}/{}: {}", bucket, key, e)))?
            .into_bytes();

        tracing::debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(data.to_vec())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let size = body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(|e| classify("PutObject", bucket, key, e))?;

        tracing::debug!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        match self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match classify("DeleteObject", bucket, key, e) {
                MirrorError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<FileMap> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut files = FileMap::new();
        let mut page_count = 0usize;

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify("ListObjectsV2", bucket, prefix, e))?;
            page_count += 1;

            for object in page.contents() {
                let (Some(key), Some(etag)) = (object.key(), object.e_tag()) else {
                    continue;
                };
                if let Some(name) = strip_prefix(key, prefix) {
                    files.insert(name.to_string(), unquote_etag(etag).to_string());
                }
            }
        }

        tracing::debug!(
            "Listed {} objects under s3://{}/{} ({} pages)",
            files.len(),
            bucket,
            prefix,
            page_count
        );
        Ok(files)
    }

    async fn create_bucket_if_absent(&self, bucket: &str) -> Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => match classify("HeadBucket", bucket, "", e) {
                MirrorError::NotFound { .. } => {}
                other => return Err(other),
            },
        }

        tracing::info!("Creating bucket: {}", bucket);
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracing::info!("Bucket {} created", bucket);
                Ok(())
            }
            Err(e) => {
                let owned = e
                    .as_service_error()
                    .and_then(|se| se.code())
                    .is_some_and(|c| c == "BucketAlreadyOwnedByYou");
                if owned {
                    Ok(())
                } else {
                    Err(classify("CreateBucket", bucket, "", e))
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
