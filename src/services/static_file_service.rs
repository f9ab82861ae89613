//! src/services/static_file_service.rs
//!
//! StaticFileService ties folder and file records (SQLite, via `Catalog`) to
//! the stores holding file content (`StorageBackends`), and issues signed
//! upload forms for large files.
//!
//! Every mutating call validates first and only then touches storage. Folder
//! configuration is re-read for each call and never cached.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::{
        folder::{FolderInput, StaticFolder},
        static_file::{
            ConsistencyError, FileInput, FileType, FileUpdate, FileView, ResolvedFile, StaticFile,
        },
        upload::UploadForm,
    },
    services::{
        backend::{FileContent, StorageBackends},
        catalog::Catalog,
        upload::UploadCredentialIssuer,
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A signed form plus the uploader page URL that carries it.
#[derive(Clone, Debug)]
pub struct IssuedUpload {
    pub form: UploadForm,
    pub redirect_url: String,
}

#[derive(Clone)]
pub struct StaticFileService {
    pub catalog: Catalog,
    pub backends: StorageBackends,
    pub issuer: UploadCredentialIssuer,
}

impl StaticFileService {
    pub fn new(catalog: Catalog, backends: StorageBackends, issuer: UploadCredentialIssuer) -> Self {
        Self {
            catalog,
            backends,
            issuer,
        }
    }

    /// Validate and store a new folder.
    pub async fn create_folder(&self, input: FolderInput) -> ServiceResult<StaticFolder> {
        let folder = input.into_folder(Uuid::new_v4(), Utc::now());
        folder.validate()?;
        self.catalog.insert_folder(&folder).await?;
        info!(folder_id = %folder.id, folder = %folder.folder_name, "created folder");
        Ok(folder)
    }

    /// Replace a folder's configuration.
    ///
    /// A folder that still holds `s3` files cannot stop using its bucket.
    /// Renaming a folder moves the directory of its local files with it.
    pub async fn update_folder(&self, id: Uuid, input: FolderInput) -> ServiceResult<StaticFolder> {
        let existing = self.catalog.fetch_folder(id).await?;
        let folder = input.into_folder(existing.id, existing.created_at);
        folder.validate()?;

        if existing.uses_object_store && !folder.uses_object_store {
            let s3_files = self.catalog.count_files_of_type(id, FileType::S3).await?;
            if s3_files > 0 {
                return Err(ConsistencyError::BucketRequiredForObjectStoreType.into());
            }
        }

        let mut tx = self.catalog.begin().await?;
        Catalog::update_folder(&mut *tx, &folder).await?;
        let renamed = existing.folder_name != folder.folder_name;
        if renamed {
            self.backends
                .local
                .rename_folder(&existing.folder_name, &folder.folder_name)
                .await?;
        }
        if let Err(err) = tx.commit().await {
            if renamed {
                if let Err(undo) = self
                    .backends
                    .local
                    .rename_folder(&folder.folder_name, &existing.folder_name)
                    .await
                {
                    warn!(folder_id = %id, error = %undo, "failed to move folder directory back");
                }
            }
            return Err(err.into());
        }

        info!(folder_id = %folder.id, renamed, "updated folder");
        Ok(folder)
    }

    pub async fn get_folder(&self, id: Uuid) -> ServiceResult<StaticFolder> {
        self.catalog.fetch_folder(id).await
    }

    pub async fn list_folders(
        &self,
        uses_object_store: Option<bool>,
    ) -> ServiceResult<Vec<StaticFolder>> {
        self.catalog.list_folders(uses_object_store).await
    }

    /// Folders a file of `file_type` may be placed in.
    pub async fn folder_choices(&self, file_type: FileType) -> ServiceResult<Vec<StaticFolder>> {
        self.catalog.list_folders(Some(file_type.is_s3_bucket())).await
    }

    /// Register a file and store its inline content, if any.
    ///
    /// The record insert and the content write succeed or fail together.
    pub async fn create_file(&self, input: FileInput) -> ServiceResult<FileView> {
        let content = match input.content.as_deref() {
            Some(encoded) => Some(
                general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|err| ServiceError::InvalidInput(format!("content: {}", err)))?,
            ),
            None => None,
        };

        let folder = self.catalog.fetch_folder(input.folder_id).await?;
        folder.validate()?;
        let file = StaticFile {
            id: Uuid::new_v4(),
            folder_id: folder.id,
            name: input.name,
            file_type: input.file_type,
            remote_url: input.remote_url,
            is_large_file: false,
            created_at: Utc::now(),
        };
        let resolved = ResolvedFile::new(file, folder);
        resolved.validate()?;

        let mut tx = self.catalog.begin().await?;
        Catalog::insert_file(&mut *tx, &resolved.file).await?;
        if let Some(content) = content {
            self.backends
                .set_bytes(&resolved, Bytes::from(content))
                .await?;
        }
        tx.commit().await?;

        info!(
            file_id = %resolved.file.id,
            name = %resolved.file.name,
            file_type = ?resolved.file.file_type,
            "registered file"
        );
        Ok(view(resolved))
    }

    pub async fn get_file(&self, id: Uuid) -> ServiceResult<FileView> {
        Ok(view(self.catalog.fetch_resolved(id).await?))
    }

    /// Switch a file to another backend. Existing content is not moved.
    pub async fn change_file_type(&self, id: Uuid, update: FileUpdate) -> ServiceResult<FileView> {
        let mut file = self.catalog.fetch_resolved(id).await?;
        let needs_bucket = file.file.on_type_changed(update.file_type);
        if update.remote_url.is_some() {
            file.file.remote_url = update.remote_url;
        }
        file.folder.validate()?;
        file.validate()?;

        self.catalog.update_file(&file.file).await?;
        debug!(file_id = %id, file_type = ?file.file.file_type, needs_bucket, "changed file type");
        Ok(view(file))
    }

    pub async fn get_content(&self, id: Uuid) -> ServiceResult<FileContent> {
        let file = self.catalog.fetch_resolved(id).await?;
        self.backends.get_bytes(&file).await
    }

    /// Replace a file's content. Rejected before any write when the record no
    /// longer fits its folder.
    pub async fn set_content(&self, id: Uuid, body: Bytes) -> ServiceResult<()> {
        let file = self.catalog.fetch_resolved(id).await?;
        file.folder.validate()?;
        file.validate()?;
        debug!(file_id = %id, size = body.len(), "writing file content");
        self.backends.set_bytes(&file, body).await
    }

    /// Content of a local file addressed by folder and file name.
    pub async fn serve_local(&self, folder_name: &str, name: &str) -> ServiceResult<FileContent> {
        let file = self.catalog.find_resolved(folder_name, name).await?;
        if file.file.file_type != FileType::Local {
            return Err(ServiceError::FileNotFound(format!("{}/{}", folder_name, name)));
        }
        self.backends.get_bytes(&file).await
    }

    /// Remove a file's record and its content together. The record delete is
    /// only committed once the content is gone.
    pub async fn delete_file(&self, id: Uuid) -> ServiceResult<()> {
        let file = self.catalog.fetch_resolved(id).await?;
        let mut tx = self.catalog.begin().await?;
        Catalog::delete_file(&mut *tx, id).await?;
        self.backends.delete(&file).await?;
        if let Err(err) = tx.commit().await {
            warn!(file_id = %id, key = %file.object_key(), "content removed but record kept");
            return Err(err.into());
        }
        info!(file_id = %id, "deleted file");
        Ok(())
    }

    /// Sign an upload form for a file and mark the file as large.
    ///
    /// The mark is committed before the form is returned, whether or not the
    /// browser upload ever happens.
    pub async fn issue_upload_credentials(&self, id: Uuid) -> ServiceResult<IssuedUpload> {
        let file = self.catalog.fetch_resolved(id).await?;
        let form = self.issuer.prepare(&file).await?;
        let redirect_url = self.issuer.redirect_target(&form)?;

        self.catalog.mark_large(id).await?;
        info!(file_id = %id, key = %file.object_key(), "issued upload credentials");

        Ok(IssuedUpload { form, redirect_url })
    }
}

fn view(file: ResolvedFile) -> FileView {
    let url = StorageBackends::url(&file);
    let s3_key = file.object_key();
    let is_s3_bucket = file.is_s3_backed();
    FileView {
        file: file.file,
        is_s3_bucket,
        s3_key,
        url,
    }
}
