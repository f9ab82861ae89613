//! Represents a static file registered in a folder.

use super::folder::StaticFolder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Which backing store serves a file's bytes and URL.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FileType {
    /// Stored on local disk beneath the service's storage directory.
    #[default]
    Local,
    /// Hosted elsewhere; only the URL is known.
    Remote,
    /// Stored in the folder's S3 bucket and served through its CDN host.
    S3,
}

impl FileType {
    /// The `is_s3_bucket` flag for a file of this type. Folder choices for a
    /// file are limited to folders whose `uses_object_store` equals this flag.
    pub fn is_s3_bucket(self) -> bool {
        matches!(self, FileType::S3)
    }
}

/// Raised when a file record does not fit the folder it is attached to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Folder must have s3 bucket if type is 'S3'")]
    BucketRequiredForObjectStoreType,
    #[error("remote files need a remote URL")]
    RemoteUrlRequired,
    #[error("file name `{0}` is invalid")]
    InvalidFileName(String),
}

/// A single static file. Content bytes are not stored here; the backend
/// selected by `file_type` holds them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct StaticFile {
    pub id: Uuid,

    /// Folder this file belongs to.
    pub folder_id: Uuid,

    /// File name, unique within the folder.
    pub name: String,

    pub file_type: FileType,

    /// Location of a remote file.
    pub remote_url: Option<String>,

    /// Set once signed upload credentials were issued; the bytes then
    /// travel from the browser straight to the bucket.
    pub is_large_file: bool,

    pub created_at: DateTime<Utc>,
}

impl StaticFile {
    /// Check this file against a snapshot of its folder.
    pub fn validate(&self, folder: &StaticFolder) -> Result<(), ConsistencyError> {
        if !super::is_safe_path(&self.name) {
            return Err(ConsistencyError::InvalidFileName(self.name.clone()));
        }
        match self.file_type {
            FileType::S3 if !folder.uses_object_store => {
                Err(ConsistencyError::BucketRequiredForObjectStoreType)
            }
            FileType::Remote if self.remote_url.as_deref().is_none_or(str::is_empty) => {
                Err(ConsistencyError::RemoteUrlRequired)
            }
            _ => Ok(()),
        }
    }

    /// Switch the file type and return the recomputed `is_s3_bucket` flag.
    pub fn on_type_changed(&mut self, file_type: FileType) -> bool {
        self.file_type = file_type;
        file_type.is_s3_bucket()
    }
}

/// A file paired with the folder snapshot it was loaded with.
#[derive(Clone, Debug)]
pub struct ResolvedFile {
    pub file: StaticFile,
    pub folder: StaticFolder,
}

impl ResolvedFile {
    pub fn new(file: StaticFile, folder: StaticFolder) -> Self {
        Self { file, folder }
    }

    pub fn object_key(&self) -> String {
        self.folder.resolve_object_key(&self.file.name)
    }

    pub fn is_s3_backed(&self) -> bool {
        self.folder.uses_object_store
    }

    pub fn validate(&self) -> Result<(), ConsistencyError> {
        self.file.validate(&self.folder)
    }
}

/// Request body for registering a file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileInput {
    pub folder_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Inline content for small files, standard base64.
    #[serde(default)]
    pub content: Option<String>,
}

/// Request body for switching a file to another backend.
#[derive(Debug, Clone, Deserialize)]
pub struct FileUpdate {
    pub file_type: FileType,
    #[serde(default)]
    pub remote_url: Option<String>,
}

/// A file as exposed to clients: the stored fields plus derived ones.
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub file: StaticFile,
    pub is_s3_bucket: bool,
    pub s3_key: String,
    pub url: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::folder::tests::{local_folder, s3_folder};

    pub(crate) fn file_in(folder: &StaticFolder, name: &str, file_type: FileType) -> StaticFile {
        StaticFile {
            id: Uuid::new_v4(),
            folder_id: folder.id,
            name: name.into(),
            file_type,
            remote_url: None,
            is_large_file: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn s3_file_requires_s3_folder() {
        let local = local_folder();
        let file = file_in(&local, "logo.png", FileType::S3);
        assert_eq!(
            file.validate(&local),
            Err(ConsistencyError::BucketRequiredForObjectStoreType)
        );

        let s3 = s3_folder();
        let file = file_in(&s3, "logo.png", FileType::S3);
        assert_eq!(file.validate(&s3), Ok(()));
    }

    #[test]
    fn local_files_fit_any_folder() {
        for folder in [local_folder(), s3_folder()] {
            let file = file_in(&folder, "logo.png", FileType::Local);
            assert_eq!(file.validate(&folder), Ok(()));
        }
    }

    #[test]
    fn remote_files_need_a_url() {
        let folder = local_folder();
        let mut file = file_in(&folder, "logo.png", FileType::Remote);
        assert_eq!(file.validate(&folder), Err(ConsistencyError::RemoteUrlRequired));

        file.remote_url = Some("https://example.org/logo.png".into());
        assert_eq!(file.validate(&folder), Ok(()));
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let folder = local_folder();
        let file = file_in(&folder, "../logo.png", FileType::Local);
        assert!(matches!(
            file.validate(&folder),
            Err(ConsistencyError::InvalidFileName(_))
        ));
    }

    #[test]
    fn type_change_recomputes_flag() {
        let folder = s3_folder();
        let mut file = file_in(&folder, "logo.png", FileType::Local);
        assert!(file.on_type_changed(FileType::S3));
        assert_eq!(file.file_type, FileType::S3);
        assert!(!file.on_type_changed(FileType::Remote));
    }

    #[test]
    fn resolved_file_derives_object_key() {
        let folder = s3_folder();
        let resolved = ResolvedFile::new(file_in(&folder, "logo.png", FileType::S3), folder);
        assert_eq!(resolved.object_key(), "static/logo.png");
        assert!(resolved.is_s3_backed());
    }

    #[test]
    fn file_type_wire_names() {
        assert_eq!(serde_json::to_string(&FileType::S3).unwrap(), "\"s3\"");
        let parsed: FileType = serde_json::from_str("\"remote\"").unwrap();
        assert_eq!(parsed, FileType::Remote);
    }
}
