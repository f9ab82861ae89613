//! Represents a static folder: a group of files sharing one storage
//! configuration, optionally backed by an S3 bucket fronted by a CDN.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_CDN_HOST: &str = "http://your-domain.cloudfront.net";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_UPLOAD_FORM_TTL_SECS: i64 = 3600;

/// Raised when a folder configuration is created or edited with invalid values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("CDN host with '/' at the end is not allowed")]
    InvalidCname,
    #[error("`{0}` is required when the folder uses an S3 bucket")]
    MissingCredentials(&'static str),
    #[error("folder name `{0}` is invalid")]
    InvalidFolderName(String),
    #[error("object key prefix `{0}` is invalid")]
    InvalidObjectKeyPrefix(String),
    #[error("upload form lifetime must be positive, got {0} seconds")]
    InvalidUploadTtl(i64),
}

/// A folder of static files and the bucket configuration its files use.
///
/// Folders are edited by an administrator and read as an immutable snapshot
/// whenever one of their files is validated, read or written.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct StaticFolder {
    /// Unique identifier for this folder.
    pub id: Uuid,

    /// Unique folder name, also the directory name for local files.
    pub folder_name: String,

    pub description: String,

    /// Whether files of type `s3` may live in this folder.
    pub uses_object_store: bool,

    pub access_key: String,

    /// Never serialized back out.
    #[serde(skip_serializing)]
    pub secret_key: String,

    pub bucket_name: String,

    /// Region used to scope signed upload credentials.
    pub region: String,

    /// Public host prefixed to object keys, e.g. `http://cdn.example.net`.
    /// Never ends with `/`.
    pub cdn_host: String,

    /// Optional prefix joined to file names with `/` to form object keys.
    pub object_key_prefix: String,

    /// Whether browser uploads through signed POST forms are allowed.
    pub allow_large_uploads: bool,

    /// Lifetime of a signed upload form, in seconds.
    pub upload_form_ttl_secs: i64,

    pub created_at: DateTime<Utc>,
}

/// Credentials and addressing for one object-store call.
///
/// Built from a folder snapshot right before the call and dropped after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketTarget {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

impl StaticFolder {
    /// Check the folder configuration before it is saved.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let name = self.folder_name.trim();
        if name.is_empty()
            || name != self.folder_name
            || name == "."
            || name.contains('/')
            || !super::is_safe_path(name)
        {
            return Err(ConfigurationError::InvalidFolderName(
                self.folder_name.clone(),
            ));
        }

        if self.cdn_host.ends_with('/') {
            return Err(ConfigurationError::InvalidCname);
        }

        // Keys are `prefix/name`; the prefix must itself be a safe key.
        let prefix = self.object_key_prefix.as_str();
        if !prefix.is_empty() && (prefix.ends_with('/') || !super::is_safe_path(prefix)) {
            return Err(ConfigurationError::InvalidObjectKeyPrefix(prefix.to_string()));
        }

        if self.uses_object_store {
            let required = [
                ("access_key", &self.access_key),
                ("secret_key", &self.secret_key),
                ("bucket_name", &self.bucket_name),
                ("cdn_host", &self.cdn_host),
            ];
            if let Some((field, _)) = required.into_iter().find(|(_, value)| value.is_empty()) {
                return Err(ConfigurationError::MissingCredentials(field));
            }
            if self.allow_large_uploads && self.upload_form_ttl_secs <= 0 {
                return Err(ConfigurationError::InvalidUploadTtl(
                    self.upload_form_ttl_secs,
                ));
            }
        }

        Ok(())
    }

    /// Object key for `file_name`: `prefix/file_name`, or the bare name when
    /// the folder has no prefix.
    pub fn resolve_object_key(&self, file_name: &str) -> String {
        if self.object_key_prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.object_key_prefix, file_name)
        }
    }

    pub fn connection(&self) -> BucketTarget {
        BucketTarget {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            bucket: self.bucket_name.clone(),
            region: self.region.clone(),
        }
    }
}

/// Request body for creating or editing a folder.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderInput {
    pub folder_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uses_object_store: bool,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_cdn_host")]
    pub cdn_host: String,
    #[serde(default)]
    pub object_key_prefix: String,
    #[serde(default)]
    pub allow_large_uploads: bool,
    #[serde(default = "default_upload_form_ttl_secs")]
    pub upload_form_ttl_secs: i64,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_cdn_host() -> String {
    DEFAULT_CDN_HOST.to_string()
}

fn default_upload_form_ttl_secs() -> i64 {
    DEFAULT_UPLOAD_FORM_TTL_SECS
}

impl FolderInput {
    pub fn into_folder(self, id: Uuid, created_at: DateTime<Utc>) -> StaticFolder {
        StaticFolder {
            id,
            folder_name: self.folder_name,
            description: self.description,
            uses_object_store: self.uses_object_store,
            access_key: self.access_key,
            secret_key: self.secret_key,
            bucket_name: self.bucket_name,
            region: self.region,
            cdn_host: self.cdn_host,
            object_key_prefix: self.object_key_prefix,
            allow_large_uploads: self.allow_large_uploads,
            upload_form_ttl_secs: self.upload_form_ttl_secs,
            created_at,
        }
    }
}
