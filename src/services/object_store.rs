//! src/services/object_store.rs
//!
//! The object-store capability used by S3-backed files: put, get and delete
//! whole objects, and build signed POST forms. The production client lives in
//! `s3_store`; `DiskObjectStore` is a development backend that keeps objects
//! on local disk sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::models::{folder::BucketTarget, is_safe_path, upload::UploadForm};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("access denied to bucket `{0}`")]
    AccessDenied(String),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Whole-object operations against one bucket. Every call receives the
/// credentials it needs; implementations must not keep them.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Create or overwrite the object at `key`.
    async fn put_object(&self, target: &BucketTarget, key: &str, body: Bytes)
    -> ObjectStoreResult<()>;

    /// Fetch the object at `key`; `NotFound` when it does not exist.
    async fn get_object(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<Bytes>;

    /// Delete the object at `key`; `NotFound` when it does not exist.
    async fn delete_object(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<()>;

    /// Signed POST form letting a browser upload `key` directly, valid for
    /// `expires_in_secs` from now.
    async fn presigned_post(
        &self,
        target: &BucketTarget,
        key: &str,
        expires_in_secs: u32,
    ) -> ObjectStoreResult<UploadForm>;
}

pub(crate) fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
    if is_safe_path(key) {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidObjectKey(key.to_string()))
    }
}

/// Object store kept on local disk.
#[derive(Clone, Debug)]
pub struct DiskObjectStore {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject calls without credentials or with a bucket name that could
    /// escape the base directory.
    fn connect(&self, target: &BucketTarget) -> ObjectStoreResult<PathBuf> {
        if target.access_key.is_empty() || target.secret_key.is_empty() {
            return Err(ObjectStoreError::AccessDenied(target.bucket.clone()));
        }
        let bucket = target.bucket.as_str();
        let well_formed = (3..=63).contains(&bucket.len())
            && bucket
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
            && !bucket.contains("..");
        if !well_formed {
            return Err(ObjectStoreError::AccessDenied(target.bucket.clone()));
        }
        Ok(self.base_path.join(bucket))
    }

    /// Two-level shard identifiers from MD5(bucket/key), as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<PathBuf> {
        ensure_key_safe(key)?;
        let mut path = self.connect(target)?;
        let (shard_a, shard_b) = Self::object_shards(&target.bucket, key);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        Ok(path)
    }

    /// Remove empty directories from `start` up to, not including, `stop`.
    async fn prune_empty_dirs(start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStoreClient for DiskObjectStore {
    /// Writes to a temporary file, fsyncs, then renames into place.
    async fn put_object(
        &self,
        target: &BucketTarget,
        key: &str,
        body: Bytes,
    ) -> ObjectStoreResult<()> {
        let file_path = self.object_path(target, key)?;
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let written: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        debug!(bucket = %target.bucket, key, size = body.len(), "stored object");
        Ok(())
    }

    async fn get_object(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<Bytes> {
        let file_path = self.object_path(target, key)?;
        match fs::read(&file_path).await {
            Ok(bytes) => {
                debug!(bucket = %target.bucket, key, size = bytes.len(), "fetched object");
                Ok(Bytes::from(bytes))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ObjectStoreError::NotFound {
                bucket: target.bucket.clone(),
                key: key.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_object(&self, target: &BucketTarget, key: &str) -> ObjectStoreResult<()> {
        let file_path = self.object_path(target, key)?;
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed object file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound {
                    bucket: target.bucket.clone(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.connect(target)?;
            Self::prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// Browsers cannot post to a directory on this host.
    async fn presigned_post(
        &self,
        target: &BucketTarget,
        key: &str,
        _expires_in_secs: u32,
    ) -> ObjectStoreResult<UploadForm> {
        ensure_key_safe(key)?;
        self.connect(target)?;
        Err(ObjectStoreError::Unavailable(
            "the disk object store cannot accept browser uploads".into(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> BucketTarget {
        BucketTarget {
            access_key: "ABCD".into(),
            secret_key: "123XYZ".into(),
            bucket: "tryton-test-s3".into(),
            region: "us-east-1".into(),
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        store
            .put_object(&target(), "static/logo.png", Bytes::from_static(b"testfile"))
            .await
            .unwrap();
        let body = store.get_object(&target(), "static/logo.png").await.unwrap();
        assert_eq!(&body[..], b"testfile");
    }

    #[tokio::test]
    async fn put_overwrites_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        for body in [&b"first"[..], &b"second"[..]] {
            store
                .put_object(&target(), "logo.png", Bytes::copy_from_slice(body))
                .await
                .unwrap();
        }
        let body = store.get_object(&target(), "logo.png").await.unwrap();
        assert_eq!(&body[..], b"second");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        let err = store.get_object(&target(), "missing.png").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_removes_object_and_empty_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        store
            .put_object(&target(), "logo.png", Bytes::from_static(b"x"))
            .await
            .unwrap();
        store.delete_object(&target(), "logo.png").await.unwrap();

        let bucket_root = dir.path().join("tryton-test-s3");
        let leftovers = std::fs::read_dir(&bucket_root).unwrap().count();
        assert_eq!(leftovers, 0);

        let err = store.delete_object(&target(), "logo.png").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn calls_without_credentials_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        let anonymous = BucketTarget {
            secret_key: String::new(),
            ..target()
        };
        let err = store.get_object(&anonymous, "logo.png").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        let err = store
            .put_object(&target(), "../escape", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::InvalidObjectKey(_)));
    }

    #[tokio::test]
    async fn disk_store_refuses_browser_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path());
        let err = store
            .presigned_post(&target(), "video.mp4", 600)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Unavailable(_)));
    }
}
