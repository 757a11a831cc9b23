// urlbackup/src/storage/s3.rs
use anyhow::{Context, Result, anyhow};
use aws_sdk_s3 as s3;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    MetadataDirective,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::ObjectStore;
use crate::backup::naming::ArtifactName;
use crate::config::{DEFAULT_REGION, StorageConfig};

const KEY_SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Largest object `CopyObject` accepts; bigger ones are copied part by part.
const MAX_SINGLE_COPY_SIZE: u64 = 5 * 1024 * 1024 * 1024;
const COPY_PART_SIZE: u64 = 512 * 1024 * 1024;
const MAX_PARTS: u64 = 10_000;

/// An S3 bucket (AWS or any S3-compatible service) used as the backup container.
pub struct S3ObjectStore {
    client: s3::Client,
    bucket: String,
    prefix: String,
    authority: String,
    region: String,
}

impl S3ObjectStore {
    pub async fn connect(storage: &StorageConfig) -> Result<Self> {
        let authority = endpoint_authority(storage.endpoint_url.as_deref(), &storage.region)?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()))
            .credentials_provider(Credentials::new(
                &storage.account,
                &storage.secret,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Path-style addressing keeps the bucket out of the host name, which
        // is what S3-compatible services and the backup URL both expect.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        debug!(
            "Using S3 container {} at {} (region {})",
            storage.container, authority, storage.region
        );

        Ok(Self {
            client: s3::Client::from_conf(s3_config),
            bucket: storage.container.clone(),
            prefix: normalize_prefix(storage.folder_prefix.as_deref()),
            authority,
            region: storage.region.clone(),
        })
    }

    fn key(&self, artifact: &str) -> String {
        format!("{}{}", self.prefix, artifact)
    }

    async fn create_bucket(&self) -> Result<()> {
        info!("Creating S3 bucket {}", self.bucket);

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to create S3 bucket {}", self.bucket))?;
        Ok(())
    }

    async fn object_size(&self, key: &str) -> Result<u64> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to read s3://{}/{}", self.bucket, key))?;

        Ok(head.content_length().unwrap_or_default().max(0) as u64)
    }

    /// Replaces the metadata of an object too large for `CopyObject` by
    /// copying it onto itself with a multipart upload.
    async fn put_metadata_multipart(
        &self,
        key: &str,
        size: u64,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(metadata))
            .send()
            .await
            .with_context(|| format!("Failed to start multipart copy of s3://{}/{}", self.bucket, key))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| anyhow!("No upload id returned for s3://{}/{}", self.bucket, key))?
            .to_string();

        let result = self.copy_parts(key, size, &upload_id).await;
        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!("Failed to abort multipart copy {} of {}: {}", upload_id, key, e);
            }
        }
        result
    }

    async fn copy_parts(&self, key: &str, size: u64, upload_id: &str) -> Result<()> {
        let source = copy_source(&self.bucket, key);
        let mut parts = Vec::new();

        for (index, (first, last)) in copy_part_ranges(size).into_iter().enumerate() {
            let part_number = i32::try_from(index + 1)?;
            let copied = self
                .client
                .upload_part_copy()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(&source)
                .copy_source_range(format!("bytes={first}-{last}"))
                .send()
                .await
                .with_context(|| format!("Failed to copy part {part_number} of s3://{}/{}", self.bucket, key))?;

            let e_tag = copied
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .ok_or_else(|| anyhow!("No ETag returned for part {part_number} of {key}"))?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(e_tag)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("Failed to complete multipart copy of s3://{}/{}", self.bucket, key))?;
        Ok(())
    }
}

impl ObjectStore for S3ObjectStore {
    async fn ensure_container(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("S3 bucket {} exists", self.bucket);
                Ok(())
            }
            Err(e) => {
                let error = e.into_service_error();
                if error.is_not_found() {
                    self.create_bucket().await
                } else {
                    Err(error).with_context(|| {
                        format!("Could not access S3 bucket {} at {}", self.bucket, self.authority)
                    })
                }
            }
        }
    }

    fn destination_url(&self, artifact: &ArtifactName) -> String {
        artifact_url(&self.authority, &self.bucket, &self.prefix, artifact.as_str())
    }

    fn credential_scope(&self) -> String {
        scope_url(&self.authority, &self.bucket, &self.prefix)
    }

    async fn put_metadata(&self, artifact: &str, metadata: HashMap<String, String>) -> Result<()> {
        let key = self.key(artifact);

        // S3 metadata is immutable; replace it by copying the object onto itself.
        let size = self.object_size(&key).await?;
        if size > MAX_SINGLE_COPY_SIZE {
            debug!("{} is {} bytes, tagging it with a multipart copy", key, size);
            return self.put_metadata_multipart(&key, size, metadata).await;
        }

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&key)
            .copy_source(copy_source(&self.bucket, &key))
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata))
            .send()
            .await
            .with_context(|| format!("Failed to set metadata on s3://{}/{}", self.bucket, key))?;
        Ok(())
    }

    async fn list_artifacts(&self) -> Result<Vec<String>> {
        let prefix = (!self.prefix.is_empty()).then(|| self.prefix.clone());
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix)
            .delimiter("/")
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.with_context(|| {
                format!("Failed to list objects in s3://{}/{}", self.bucket, self.prefix)
            })?;
            keys.extend(page.contents().iter().filter_map(|o| o.key()).map(str::to_string));
            for folder in page.common_prefixes().iter().filter_map(|p| p.prefix()) {
                debug!("Not rotating s3://{}/{}: nested folders are ignored", self.bucket, folder);
            }
        }

        let artifacts = flat_artifact_names(&self.prefix, &keys);
        debug!("Listed {} artifacts in s3://{}/{}", artifacts.len(), self.bucket, self.prefix);
        Ok(artifacts)
    }

    async fn fetch_metadata(&self, artifact: &str) -> Result<Option<HashMap<String, String>>> {
        let key = self.key(artifact);
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to read metadata of s3://{}/{}", self.bucket, key))?;

        Ok(head.metadata().filter(|m| !m.is_empty()).cloned())
    }

    async fn delete(&self, artifact: &str) -> Result<()> {
        let key = self.key(artifact);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;
        Ok(())
    }
}

/// `folder/sub` becomes `folder/sub/`; an empty prefix stays empty.
fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim().trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/"),
        _ => String::new(),
    }
}

/// `host[:port]` of the endpoint, or the regional AWS host when none is set.
fn endpoint_authority(endpoint: Option<&str>, region: &str) -> Result<String> {
    let Some(endpoint) = endpoint else {
        return Ok(format!("s3.{region}.amazonaws.com"));
    };

    let url = Url::parse(endpoint).with_context(|| format!("Invalid S3 endpoint: {endpoint}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("S3 endpoint has no host: {endpoint}"))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn artifact_url(authority: &str, bucket: &str, prefix: &str, name: &str) -> String {
    format!("s3://{authority}/{bucket}/{prefix}{name}")
}

/// `s3://host/bucket[/prefix]`, a prefix of every [`artifact_url`].
fn scope_url(authority: &str, bucket: &str, prefix: &str) -> String {
    format!("s3://{authority}/{bucket}/{prefix}")
        .trim_end_matches('/')
        .to_string()
}

/// `bucket/key` with each key segment percent-encoded.
fn copy_source(bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{key}")
}

/// Inclusive byte ranges covering `size` bytes within the part count limit.
fn copy_part_ranges(size: u64) -> Vec<(u64, u64)> {
    let part_size = COPY_PART_SIZE.max(size.div_ceil(MAX_PARTS));
    (0..size)
        .step_by(part_size as usize)
        .map(|first| (first, (first + part_size).min(size) - 1))
        .collect()
}

/// Names directly below `prefix`. Keys in nested folders are left out.
fn flat_artifact_names(prefix: &str, keys: &[String]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| key.strip_prefix(prefix))
        .filter(|name| {
            let flat = !name.is_empty() && !name.contains('/');
            if !flat && !name.is_empty() {
                debug!("Not rotating {}: nested folders are ignored", name);
            }
            flat
        })
        .map(str::to_string)
        .collect()
}
