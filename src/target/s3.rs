//! S3-compatible target
//!
//! Built on the AWS SDK. Keys must be valid UTF-8; anything else is rejected
//! client-side with `TargetError::InvalidKey` before a request is made. Bodies
//! above [`MULTIPART_THRESHOLD`] are streamed from the generator in parts.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::config::S3Options;
use super::{ObjectReader, Target, TargetError, TargetResult};
use crate::keys::ObjectKey;

/// Objects larger than this are uploaded with multipart upload
pub const MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Smallest part size S3 accepts (except for the last part)
const MIN_PART_SIZE: u64 = 8 * 1024 * 1024;

/// S3 allows at most this many parts per upload
const MAX_PARTS: u64 = 10_000;

/// S3 bucket, optionally restricted to a key prefix
pub struct S3Target {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Target {
    /// Build a client from the default credential chain plus `options`
    pub async fn connect(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        options: &S3Options,
    ) -> TargetResult<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(TargetError::InvalidConfig {
                backend: "s3".to_string(),
                message: "bucket name must not be empty".to_string(),
            });
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &options.endpoint {
            // custom endpoints (MinIO, Ceph, LocalStack) need path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
            prefix: normalize_prefix(prefix.into()),
        })
    }

    fn object_key(&self, key: &ObjectKey) -> TargetResult<String> {
        let text = key.to_str().map_err(|e| TargetError::InvalidKey {
            key: key.to_string(),
            reason: format!("S3 keys must be valid UTF-8: {}", e),
        })?;
        if text.is_empty() {
            return Err(TargetError::InvalidKey {
                key: key.to_string(),
                reason: "key must not be empty".to_string(),
            });
        }
        Ok(format!("{}{}", self.prefix, text))
    }

    async fn put_single(&self, key: &str, mut content: ObjectReader, length: u64) -> TargetResult<()> {
        let mut data = Vec::with_capacity(length as usize);
        content.read_to_end(&mut data).await?;
        check_length(length, data.len() as u64)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(length as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, "put", key))?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, mut content: ObjectReader, length: u64) -> TargetResult<()> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, "put", key))?;
        let upload_id = response
            .upload_id()
            .ok_or_else(|| TargetError::Other {
                backend: "s3".to_string(),
                message: "No upload ID returned".to_string(),
            })?
            .to_string();

        let part_size = part_size_for(length);
        debug!(
            "Multipart upload of {} bytes to {} in parts of {} bytes",
            length, key, part_size
        );

        match self
            .upload_parts(key, &upload_id, &mut content, length, part_size)
            .await
        {
            Ok(parts) => {
                let upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(upload)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(e, "put", key))?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "Failed to abort multipart upload {} for {}: {}",
                        upload_id,
                        key,
                        DisplayErrorContext(&abort_err)
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        content: &mut ObjectReader,
        length: u64,
        part_size: u64,
    ) -> TargetResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut uploaded = 0u64;
        let mut part_number = 1i32;

        while uploaded < length {
            let this_part = part_size.min(length - uploaded);
            let mut chunk = Vec::with_capacity(this_part as usize);
            content.as_mut().take(this_part).read_to_end(&mut chunk).await?;
            check_length(uploaded + this_part, uploaded + chunk.len() as u64)?;

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, "put", key))?;

            let etag = response.e_tag().ok_or_else(|| TargetError::Other {
                backend: "s3".to_string(),
                message: format!("No ETag returned for part {}", part_number),
            })?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            uploaded += this_part;
            part_number += 1;
        }
        Ok(parts)
    }
}

#[async_trait]
impl Target for S3Target {
    async fn put(&self, key: &ObjectKey, content: ObjectReader, length: u64) -> TargetResult<()> {
        let key = self.object_key(key)?;
        if length > MULTIPART_THRESHOLD {
            self.put_multipart(&key, content, length).await
        } else {
            self.put_single(&key, content, length).await
        }
    }

    async fn get(&self, key: &ObjectKey) -> TargetResult<ObjectReader> {
        let key = self.object_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, "get", &key))?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn head(&self, key: &ObjectKey) -> TargetResult<bool> {
        let key = self.object_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match classify_sdk_error(e, "head", &key) {
                err if err.is_not_found() => Ok(false),
                err => Err(err),
            },
        }
    }

    async fn delete(&self, key: &ObjectKey) -> TargetResult<()> {
        let key = self.object_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, "delete", &key))?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "s3"
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

fn part_size_for(length: u64) -> u64 {
    MIN_PART_SIZE.max(length.div_ceil(MAX_PARTS))
}

fn check_length(expected: u64, actual: u64) -> TargetResult<()> {
    if expected != actual {
        return Err(TargetError::Io {
            kind: std::io::ErrorKind::UnexpectedEof,
            message: format!("expected {} bytes, read {}", expected, actual),
        });
    }
    Ok(())
}

/// Map an SDK failure onto the target error taxonomy
fn classify_sdk_error<E>(err: SdkError<E>, operation: &str, key: &str) -> TargetError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(context) => {
            let code = context.err().code().unwrap_or_default().to_string();
            let status = context.raw().status().as_u16();
            classify_service_error(&code, status, operation, key, message)
        }
        SdkError::TimeoutError(_) => TargetError::Timeout {
            operation: operation.to_string(),
            message,
        },
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => TargetError::Network(message),
        _ => TargetError::Other {
            backend: "s3".to_string(),
            message,
        },
    }
}

fn classify_service_error(
    code: &str,
    status: u16,
    operation: &str,
    key: &str,
    message: String,
) -> TargetError {
    match code {
        "NoSuchKey" | "NotFound" => TargetError::NotFound {
            key: key.to_string(),
        },
        "SlowDown" | "Throttling" | "ThrottlingException" | "TooManyRequests"
        | "RequestLimitExceeded" => TargetError::RateLimited(message),
        "RequestTimeout" => TargetError::Timeout {
            operation: operation.to_string(),
            message,
        },
        "InternalError" | "ServiceUnavailable" => TargetError::Network(message),
        "AccessDenied" | "AllAccessDisabled" | "AccountProblem" => {
            TargetError::PermissionDenied(message)
        }
        "InvalidAccessKeyId" | "ExpiredToken" | "InvalidToken" => {
            TargetError::Authentication(message)
        }
        "NoSuchBucket" | "PermanentRedirect" | "AuthorizationHeaderMalformed" => {
            TargetError::InvalidConfig {
                backend: "s3".to_string(),
                message,
            }
        }
        "" => match status {
            404 => TargetError::NotFound {
                key: key.to_string(),
            },
            403 => TargetError::PermissionDenied(message),
            429 => TargetError::RateLimited(message),
            500..=599 => TargetError::Network(message),
            _ => TargetError::Rejected {
                code: status.to_string(),
                message,
            },
        },
        other => TargetError::Rejected {
            code: other.to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(String::new()), "");
        assert_eq!(normalize_prefix("/".to_string()), "");
        assert_eq!(normalize_prefix("/probe".to_string()), "probe/");
        assert_eq!(normalize_prefix("probe/run/".to_string()), "probe/run/");
    }

    #[test]
    fn test_part_size() {
        assert_eq!(part_size_for(MULTIPART_THRESHOLD + 1), MIN_PART_SIZE);
        let huge = 200 * 1024 * 1024 * 1024u64;
        assert!(part_size_for(huge) * MAX_PARTS >= huge);
    }

    #[test]
    fn test_service_error_classification() {
        let classify = |code: &str, status: u16| {
            classify_service_error(code, status, "put", "k", "msg".to_string())
        };

        assert!(classify("NoSuchKey", 404).is_not_found());
        assert!(classify("", 404).is_not_found());
        assert!(classify("SlowDown", 503).is_transient());
        assert!(classify("InternalError", 500).is_transient());
        assert!(classify("InvalidAccessKeyId", 403).is_permanent());
        assert!(classify("NoSuchBucket", 404).is_permanent());
        // limits under test must never abort the run
        let err = classify("EntityTooLarge", 400);
        assert!(!err.is_permanent() && !err.is_transient());
        let err = classify("KeyTooLongError", 400);
        assert!(matches!(err, TargetError::Rejected { .. }));
    }
}
