//! Per-file backend dispatch: which store answers `url`, `get_bytes`,
//! `set_bytes` and `delete` for a file is decided by its `FileType` alone.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::static_file::{FileType, ResolvedFile},
    services::object_store::{ObjectStoreClient, ObjectStoreError},
};
use bytes::Bytes;
use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// A degraded read that did not fail the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageWarning {
    /// The record exists but its object is gone from the bucket.
    MissingObject { bucket: String, key: String },
}

impl fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageWarning::MissingObject { bucket, key } => {
                write!(f, "object `{}` is missing from bucket `{}`", key, bucket)
            }
        }
    }
}

/// Bytes of a file plus any warnings raised while reading them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileContent {
    pub bytes: Bytes,
    pub warnings: Vec<StorageWarning>,
}

impl FileContent {
    fn complete(bytes: Bytes) -> Self {
        Self {
            bytes,
            warnings: Vec::new(),
        }
    }
}

/// Files of type `local`, kept at `root/{folder_name}/{name}`.
#[derive(Clone, Debug)]
pub struct LocalStore {
    pub root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, folder_name: &str, name: &str) -> PathBuf {
        self.root.join(folder_name).join(name)
    }

    pub async fn read(&self, path: &Path) -> ServiceResult<Bytes> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ServiceError::ContentNotFound(path.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write through a temporary file so readers never see partial content.
    pub async fn write(&self, path: &Path, body: &[u8]) -> ServiceResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| ServiceError::InvalidInput(path.display().to_string()))?;
        fs::create_dir_all(parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = fs::write(&tmp_path, body).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Move the directory of folder `from` to `to`. A folder that never held
    /// local content has no directory and is left alone.
    pub async fn rename_folder(&self, from: &str, to: &str) -> ServiceResult<()> {
        let source = self.root.join(from);
        let destination = self.root.join(to);
        if !fs::try_exists(&source).await? {
            return Ok(());
        }
        if fs::try_exists(&destination).await? {
            return Err(ServiceError::AlreadyExists(format!(
                "directory {}",
                destination.display()
            )));
        }
        fs::rename(&source, &destination).await?;
        debug!("moved {} to {}", source.display(), destination.display());
        Ok(())
    }

    pub async fn remove(&self, path: &Path) -> ServiceResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// The stores a file can live in.
#[derive(Clone)]
pub struct StorageBackends {
    pub local: LocalStore,
    pub object_store: Arc<dyn ObjectStoreClient>,
}

impl StorageBackends {
    pub fn new(local: LocalStore, object_store: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            local,
            object_store,
        }
    }

    /// Stable public URL of a file. No signing, no expiry.
    pub fn url(file: &ResolvedFile) -> String {
        match file.file.file_type {
            FileType::Local => format!(
                "/static-file/{}/{}",
                file.folder.folder_name, file.file.name
            ),
            FileType::Remote => file.file.remote_url.clone().unwrap_or_default(),
            FileType::S3 => format!("{}/{}", file.folder.cdn_host, file.object_key()),
        }
    }

    /// Read a file's content.
    ///
    /// An S3 object that vanished from its bucket yields empty content and a
    /// [`StorageWarning::MissingObject`]; every other failure is returned.
    pub async fn get_bytes(&self, file: &ResolvedFile) -> ServiceResult<FileContent> {
        match file.file.file_type {
            FileType::Local => {
                let path = self
                    .local
                    .path_for(&file.folder.folder_name, &file.file.name);
                Ok(FileContent::complete(self.local.read(&path).await?))
            }
            FileType::Remote => Err(ServiceError::Unsupported {
                operation: "reading content",
                file_type: FileType::Remote,
            }),
            FileType::S3 => {
                let target = file.folder.connection();
                let key = file.object_key();
                match self.object_store.get_object(&target, &key).await {
                    Ok(bytes) => Ok(FileContent::complete(bytes)),
                    Err(ObjectStoreError::NotFound { bucket, key }) => {
                        warn!(file_id = %file.file.id, %bucket, %key, "object missing from bucket");
                        Ok(FileContent {
                            bytes: Bytes::new(),
                            warnings: vec![StorageWarning::MissingObject { bucket, key }],
                        })
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    /// Store a file's content. Empty payloads are ignored, as are writes to
    /// large files whose bytes arrive through a signed browser upload.
    pub async fn set_bytes(&self, file: &ResolvedFile, body: Bytes) -> ServiceResult<()> {
        if body.is_empty() {
            return Ok(());
        }
        match file.file.file_type {
            FileType::Local => {
                let path = self
                    .local
                    .path_for(&file.folder.folder_name, &file.file.name);
                self.local.write(&path, &body).await
            }
            FileType::Remote => Err(ServiceError::Unsupported {
                operation: "writing content",
                file_type: FileType::Remote,
            }),
            FileType::S3 if file.file.is_large_file => {
                debug!(file_id = %file.file.id, "skipping write to large file");
                Ok(())
            }
            FileType::S3 => {
                let target = file.folder.connection();
                self.object_store
                    .put_object(&target, &file.object_key(), body)
                    .await?;
                Ok(())
            }
        }
    }

    /// Remove a file's content. Content that is already gone is not an error.
    pub async fn delete(&self, file: &ResolvedFile) -> ServiceResult<()> {
        match file.file.file_type {
            FileType::Local => {
                let path = self
                    .local
                    .path_for(&file.folder.folder_name, &file.file.name);
                self.local.remove(&path).await
            }
            FileType::Remote => Ok(()),
            FileType::S3 => {
                let target = file.folder.connection();
                match self.object_store.delete_object(&target, &file.object_key()).await {
                    Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            folder::tests::{local_folder, s3_folder},
            static_file::tests::file_in,
        },
        services::object_store::testing::MemoryObjectStore,
    };
    use std::sync::atomic::Ordering;

    fn backends(root: &Path) -> (StorageBackends, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::default());
        (
            StorageBackends::new(LocalStore::new(root), store.clone()),
            store,
        )
    }

    fn s3_file(name: &str) -> ResolvedFile {
        let folder = s3_folder();
        ResolvedFile::new(file_in(&folder, name, FileType::S3), folder)
    }

    #[test]
    fn s3_url_joins_cdn_host_and_key() {
        assert_eq!(
            StorageBackends::url(&s3_file("logo.png")),
            "http://cdn.example.net/static/logo.png"
        );
    }

    #[test]
    fn local_and_remote_urls() {
        let folder = local_folder();
        let local = ResolvedFile::new(file_in(&folder, "logo.png", FileType::Local), folder.clone());
        assert_eq!(StorageBackends::url(&local), "/static-file/media/logo.png");

        let mut remote = file_in(&folder, "logo.png", FileType::Remote);
        remote.remote_url = Some("https://example.org/logo.png".into());
        let remote = ResolvedFile::new(remote, folder);
        assert_eq!(StorageBackends::url(&remote), "https://example.org/logo.png");
    }

    #[tokio::test]
    async fn s3_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, store) = backends(dir.path());
        let file = s3_file("logo.png");

        backends
            .set_bytes(&file, Bytes::from_static(b"testfile"))
            .await
            .unwrap();
        assert_eq!(
            store.get("tryton-test-s3", "static/logo.png").as_deref(),
            Some(&b"testfile"[..])
        );

        let content = backends.get_bytes(&file).await.unwrap();
        assert_eq!(&content.bytes[..], b"testfile");
        assert!(content.warnings.is_empty());
    }

    #[tokio::test]
    async fn missing_object_degrades_to_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, _) = backends(dir.path());
        let content = backends.get_bytes(&s3_file("gone.png")).await.unwrap();
        assert!(content.bytes.is_empty());
        assert_eq!(
            content.warnings,
            vec![StorageWarning::MissingObject {
                bucket: "tryton-test-s3".into(),
                key: "static/gone.png".into(),
            }]
        );
    }

    #[tokio::test]
    async fn transport_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, store) = backends(dir.path());
        store.unavailable.store(true, Ordering::SeqCst);

        let err = backends.get_bytes(&s3_file("logo.png")).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Transport(ObjectStoreError::Unavailable(_))
        ));
        let err = backends
            .set_bytes(&s3_file("logo.png"), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }

    #[tokio::test]
    async fn large_files_are_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, store) = backends(dir.path());
        let mut file = s3_file("video.mp4");
        file.file.is_large_file = true;

        backends
            .set_bytes(&file, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn empty_payload_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, store) = backends(dir.path());
        backends
            .set_bytes(&s3_file("logo.png"), Bytes::new())
            .await
            .unwrap();
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn local_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, _) = backends(dir.path());
        let folder = local_folder();
        let file = ResolvedFile::new(file_in(&folder, "logo.png", FileType::Local), folder);

        backends
            .set_bytes(&file, Bytes::from_static(b"local bytes"))
            .await
            .unwrap();
        assert!(dir.path().join("media/logo.png").exists());
        let content = backends.get_bytes(&file).await.unwrap();
        assert_eq!(&content.bytes[..], b"local bytes");

        backends.delete(&file).await.unwrap();
        let err = backends.get_bytes(&file).await.unwrap_err();
        assert!(matches!(err, ServiceError::ContentNotFound(_)));
        backends.delete(&file).await.unwrap();
    }

    #[tokio::test]
    async fn remote_content_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let (backends, _) = backends(dir.path());
        let folder = local_folder();
        let mut remote = file_in(&folder, "logo.png", FileType::Remote);
        remote.remote_url = Some("https://example.org/logo.png".into());
        let remote = ResolvedFile::new(remote, folder);

        assert!(matches!(
            backends.get_bytes(&remote).await,
            Err(ServiceError::Unsupported { .. })
        ));
        assert!(matches!(
            backends.set_bytes(&remote, Bytes::from_static(b"x")).await,
            Err(ServiceError::Unsupported { .. })
        ));
    }
}
