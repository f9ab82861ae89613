//! Signed upload credentials for files too large to pass through the service.
//!
//! Issuing credentials marks the file as large before the browser has
//! uploaded anything. The mark is never reverted and never confirmed.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::{folder::StaticFolder, static_file::ResolvedFile, upload::UploadForm},
    services::object_store::ObjectStoreClient,
};
use base64::{Engine as _, engine::general_purpose};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("folder `{0}` is not backed by an S3 bucket")]
    NotObjectStoreBacked(String),
    #[error("large file uploads are disabled for folder `{0}`")]
    LargeUploadsDisabled(String),
}

/// Whether files of `folder` may be uploaded through a signed form.
pub fn check_upload_policy(folder: &StaticFolder) -> Result<(), PolicyError> {
    if !folder.uses_object_store {
        return Err(PolicyError::NotObjectStoreBacked(folder.folder_name.clone()));
    }
    if !folder.allow_large_uploads {
        return Err(PolicyError::LargeUploadsDisabled(folder.folder_name.clone()));
    }
    Ok(())
}

/// Redirect target for the external uploader page:
/// `{uploader_url}?data={base64(json({url, fields}))}`.
pub fn build_redirect_target(form: &UploadForm, uploader_url: &str) -> ServiceResult<String> {
    let payload = serde_json::to_vec(form)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    Ok(format!(
        "{}?data={}",
        uploader_url,
        general_purpose::STANDARD.encode(payload)
    ))
}

/// Builds signed forms for eligible files.
#[derive(Clone)]
pub struct UploadCredentialIssuer {
    object_store: Arc<dyn ObjectStoreClient>,
    pub uploader_url: String,
}

impl UploadCredentialIssuer {
    pub fn new(object_store: Arc<dyn ObjectStoreClient>, uploader_url: impl Into<String>) -> Self {
        Self {
            object_store,
            uploader_url: uploader_url.into(),
        }
    }

    /// Check the folder policy and sign a form for the file's object key.
    /// Persisting the large-file mark is left to the caller.
    pub async fn prepare(&self, file: &ResolvedFile) -> ServiceResult<UploadForm> {
        check_upload_policy(&file.folder)?;
        let target = file.folder.connection();
        let expires_in = u32::try_from(file.folder.upload_form_ttl_secs).unwrap_or(u32::MAX);
        let form = self
            .object_store
            .presigned_post(&target, &file.object_key(), expires_in)
            .await?;
        Ok(form)
    }

    pub fn redirect_target(&self, form: &UploadForm) -> ServiceResult<String> {
        build_redirect_target(form, &self.uploader_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            folder::tests::{local_folder, s3_folder},
            static_file::{FileType, tests::file_in},
            upload::FormField,
        },
        services::object_store::testing::MemoryObjectStore,
    };

    const UPLOADER: &str = "https://uploader.example.com/upload.html";

    fn issuer() -> UploadCredentialIssuer {
        UploadCredentialIssuer::new(Arc::new(MemoryObjectStore::default()), UPLOADER)
    }

    fn decode(target: &str) -> UploadForm {
        let data = target
            .strip_prefix(&format!("{}?data=", UPLOADER))
            .unwrap();
        let json = general_purpose::STANDARD.decode(data).unwrap();
        serde_json::from_slice(&json).unwrap()
    }

    #[test]
    fn policy_requires_s3_folder_with_large_uploads() {
        assert_eq!(check_upload_policy(&s3_folder()), Ok(()));
        assert_eq!(
            check_upload_policy(&local_folder()),
            Err(PolicyError::NotObjectStoreBacked("media".into()))
        );
        let folder = StaticFolder {
            allow_large_uploads: false,
            ..s3_folder()
        };
        assert_eq!(
            check_upload_policy(&folder),
            Err(PolicyError::LargeUploadsDisabled("s3store".into()))
        );
    }

    #[test]
    fn redirect_target_round_trips() {
        let form = UploadForm {
            url: "https://tryton-test-s3.s3.amazonaws.com/".into(),
            fields: vec![FormField {
                name: "key".into(),
                value: "static/video.mp4".into(),
            }],
        };
        let target = build_redirect_target(&form, UPLOADER).unwrap();
        assert_eq!(decode(&target), form);
    }

    #[tokio::test]
    async fn prepare_signs_the_object_key() {
        let folder = s3_folder();
        let file = ResolvedFile::new(file_in(&folder, "video.mp4", FileType::S3), folder);
        let form = issuer().prepare(&file).await.unwrap();
        assert_eq!(form.field("key"), Some("static/video.mp4"));
        assert_eq!(form.field("policy"), Some("expires-in-600"));
        assert!(form.url.starts_with("https://"));
    }

    #[tokio::test]
    async fn prepare_refuses_ineligible_folders() {
        let folder = StaticFolder {
            allow_large_uploads: false,
            ..s3_folder()
        };
        let file = ResolvedFile::new(file_in(&folder, "video.mp4", FileType::S3), folder);
        let err = issuer().prepare(&file).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Policy(PolicyError::LargeUploadsDisabled(_))
        ));
    }
}
