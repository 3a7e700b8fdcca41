//! # S3 storage client
//!
//! Implements [`StorageClient`] on top of the AWS SDK so the session state
//! machine in `s3multipart-core` can talk to S3 or any S3-compatible service.
//!
//! - Credentials come from the SDK's default provider chain.
//! - Transport and SDK failures become `Err(RemoteFailure)`.
//! - For `complete` and `abort`, an HTTP error answered by the service is
//!   returned as a [`RemoteResponse`] with the real status and the error
//!   payload, so the caller can show it to the operator.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart as S3CompletedPart,
    ServerSideEncryption as S3ServerSideEncryption,
};
use aws_sdk_s3::Client;
use serde_json::{json, Map, Value};
use std::path::Path;

use s3multipart_core::contract::{
    CompletedPart, CreatedUpload, RemoteFailure, RemoteResponse, ServerSideEncryption,
    StorageClient, UploadTarget,
};

use crate::load_config::StorageConfig;

/// Status S3 answers a successful CompleteMultipartUpload with.
const COMPLETE_OK: u16 = 200;
/// Status S3 answers a successful AbortMultipartUpload with.
const ABORT_OK: u16 = 204;

#[derive(Clone)]
pub struct S3Client {
    client: Client,
}

impl S3Client {
    /// Build a client from the default AWS environment plus any overrides in `config`.
    pub async fn new(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        // Required for MinIO and other S3-compatible services
        builder = builder.force_path_style(config.force_path_style);

        tracing::info!(
            region = ?shared.region(),
            endpoint = config.endpoint.as_deref().unwrap_or("<aws>"),
            force_path_style = config.force_path_style,
            "Initialized S3 client"
        );
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

fn failure<E>(err: SdkError<E>) -> RemoteFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    DisplayErrorContext(&err).to_string().into()
}

/// Turns a service-level rejection into a `RemoteResponse`; anything else is a failure.
fn rejection<E>(err: SdkError<E>) -> Result<RemoteResponse, RemoteFailure>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(context) = &err {
        let status = context.raw().status().as_u16();
        let service_err = context.err();
        tracing::warn!(
            status,
            code = service_err.code().unwrap_or_default(),
            "Storage service rejected request"
        );
        return Ok(RemoteResponse::new(
            status,
            json!({
                "Error": {
                    "Code": service_err.code(),
                    "Message": service_err.message(),
                },
                "ResponseMetadata": { "HTTPStatusCode": status },
            }),
        ));
    }
    Err(failure(err))
}

#[async_trait]
impl StorageClient for S3Client {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        encryption: ServerSideEncryption,
    ) -> Result<CreatedUpload, RemoteFailure> {
        tracing::info!(bucket, key, %encryption, "Sending CreateMultipartUpload");
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .server_side_encryption(S3ServerSideEncryption::from(encryption.as_str()))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %DisplayErrorContext(&e), bucket, key, "CreateMultipartUpload failed");
                failure(e)
            })?;

        let upload_id = output
            .upload_id()
            .ok_or("CreateMultipartUpload response carried no UploadId")?
            .to_string();

        let mut fields = Map::new();
        if let Some(sse) = output.server_side_encryption() {
            fields.insert("ServerSideEncryption".into(), Value::from(sse.as_str()));
        }
        if let Some(abort_date) = output.abort_date() {
            fields.insert("AbortDate".into(), Value::from(abort_date.secs()));
        }
        if let Some(rule_id) = output.abort_rule_id() {
            fields.insert("AbortRuleId".into(), Value::from(rule_id));
        }
        if let Some(enabled) = output.bucket_key_enabled() {
            fields.insert("BucketKeyEnabled".into(), Value::from(enabled));
        }

        Ok(CreatedUpload { upload_id, fields })
    }

    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: i32,
        body: &Path,
    ) -> Result<String, RemoteFailure> {
        let stream = ByteStream::from_path(body).await?;
        let output = self
            .client
            .upload_part()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(&target.upload_id)
            .part_number(part_number)
            .body(stream)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %DisplayErrorContext(&e), part_number, "UploadPart failed");
                failure(e)
            })?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| format!("UploadPart response for part {part_number} carried no ETag").into())
    }

    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        parts: Vec<CompletedPart>,
    ) -> Result<RemoteResponse, RemoteFailure> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        S3CompletedPart::builder()
                            .e_tag(&p.e_tag)
                            .part_number(p.part_number)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        tracing::info!(
            upload_id = %target.upload_id,
            parts = parts.len(),
            "Sending CompleteMultipartUpload"
        );
        match self
            .client
            .complete_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(&target.upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            Ok(output) => Ok(RemoteResponse::new(
                COMPLETE_OK,
                json!({
                    "Bucket": output.bucket(),
                    "Key": output.key(),
                    "Location": output.location(),
                    "ETag": output.e_tag(),
                }),
            )),
            Err(e) => rejection(e),
        }
    }

    async fn abort_multipart_upload(
        &self,
        target: &UploadTarget,
    ) -> Result<RemoteResponse, RemoteFailure> {
        tracing::info!(upload_id = %target.upload_id, "Sending AbortMultipartUpload");
        match self
            .client
            .abort_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(&target.upload_id)
            .send()
            .await
        {
            Ok(_) => Ok(RemoteResponse::new(
                ABORT_OK,
                json!({
                    "Bucket": target.bucket,
                    "Key": target.key,
                    "UploadId": target.upload_id,
                }),
            )),
            Err(e) => rejection(e),
        }
    }
}
