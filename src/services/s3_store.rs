//! Object store backed by Amazon S3 (or an S3-compatible endpoint) through
//! the `rust-s3` client. A fresh `Bucket` handle is built for every call from
//! the folder's own credentials; nothing is cached between calls.

use crate::{
    models::{
        folder::BucketTarget,
        upload::{FormField, UploadForm},
    },
    services::object_store::{
        ObjectStoreClient, ObjectStoreError, ObjectStoreResult, ensure_key_safe,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use s3::{
    Region,
    bucket::Bucket,
    creds::Credentials,
    error::S3Error,
    post_policy::{PostPolicy, PostPolicyField, PostPolicyValue},
};
use std::borrow::Cow;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct S3ObjectStore {
    /// Custom endpoint such as a MinIO server; `None` targets AWS for the
    /// folder's region.
    endpoint: Option<String>,
}

impl S3ObjectStore {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }

    fn region(&self, target: &BucketTarget) -> Region {
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", target.region));
        Region::Custom {
            region: target.region.clone(),
            endpoint,
        }
    }

    fn bucket(&self, target: &BucketTarget) -> ObjectStoreResult<Box<Bucket>> {
        let credentials = Credentials::new(
            Some(&target.access_key),
            Some(&target.secret_key),
            None,
            None,
            None,
        )
        .map_err(|err| ObjectStoreError::AccessDenied(format!("{}: {}", target.bucket, err)))?;
        let bucket = Bucket::new(&target.bucket, self.region(target), credentials)
            .map_err(|err| ObjectStoreError::Unavailable(err.to_string()))?;
        // Custom endpoints rarely resolve virtual-host bucket names.
        Ok(if self.endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

/// Map an HTTP status returned by S3 to the object-store error taxonomy.
fn check_status(status: u16, target: &BucketTarget, key: &str) -> ObjectStoreResult<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(ObjectStoreError::NotFound {
            bucket: target.bucket.clone(),
            key: key.to_string(),
        }),
        401 | 403 => Err(ObjectStoreError::AccessDenied(target.bucket.clone())),
        other => Err(ObjectStoreError::Unavailable(format!(
            "bucket `{}` answered with status {}",
            target.bucket, other
        ))),
    }
}

fn classify(err: S3Error, target: &BucketTarget, key: &str) -> ObjectStoreError {
    match err {
        S3Error::HttpFailWithBody(status, _) => match check_status(status, target, key) {
            Err(mapped) => mapped,
            Ok(()) => ObjectStoreError::Unavailable(format!("unexpected status {}", status)),
        },
        other => ObjectStoreError::Unavailable(other.to_string()),
    }
}

/// `key` first, then the remaining fields by name, so forms render stably.
fn order_fields(key: &str, fields: impl IntoIterator<Item = (String, String)>) -> Vec<FormField> {
    let mut rest: Vec<FormField> = fields
        .into_iter()
        .filter(|(name, _)| name != "key")
        .map(|(name, value)| FormField { name, value })
        .collect();
    rest.sort_by(|a, b| a.name.cmp(&b.name));

    let mut ordered = Vec::with_capacity(rest.len() + 1);
    ordered.push(FormField {
        name: "key".into(),
        value: key.to_string(),
    });
    ordered.extend(rest);
    ordered
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    async fn put_object(
        &self,
        target: &BucketTarget,
        key: &str,
        body: Bytes,
    ) -> ObjectStoreResult<()> {
        ensure_key_safe(key)?;
        let bucket = self.bucket(target)?;
        let response = bucket
            .put_object(key, &body)
            .await
            .map_err(|err| classify(err, target, key))?;
        check_status(response.status_code(), target, key)?;
        debug!(bucket = %target.bucket, key, size = body.len(), "stored object");
        Ok(())
    }

    async fn get_object(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<Bytes> {
        ensure_key_safe(key)?;
        let bucket = self.bucket(target)?;
        let response = bucket
            .get_object(key)
            .await
            .map_err(|err| classify(err, target, key))?;
        check_status(response.status_code(), target, key)?;
        let body = Bytes::from(response.bytes().to_vec());
        debug!(bucket = %target.bucket, key, size = body.len(), "fetched object");
        Ok(body)
    }

    async fn delete_object(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<()> {
        ensure_key_safe(key)?;
        let bucket = self.bucket(target)?;
        let response = bucket
            .delete_object(key)
            .await
            .map_err(|err| classify(err, target, key))?;
        check_status(response.status_code(), target, key)?;
        debug!(bucket = %target.bucket, key, "deleted object");
        Ok(())
    }

    async fn presigned_post(
        &self,
        target: &BucketTarget,
        key: &str,
        expires_in_secs: u32,
    ) -> ObjectStoreResult<UploadForm> {
        ensure_key_safe(key)?;
        let bucket = self.bucket(target)?;
        let policy = PostPolicy::new(expires_in_secs)
            .condition(PostPolicyField::Key, PostPolicyValue::Exact(Cow::from(key)))
            .map_err(|err| classify(err, target, key))?;
        let signed = bucket
            .presign_post(policy)
            .await
            .map_err(|err| classify(err, target, key))?;
        Ok(UploadForm {
            url: signed.url,
            fields: order_fields(key, signed.fields),
        })
    }
}
