//! src/services/catalog.rs
//!
//! SQLite persistence for folders and file records. Content bytes never pass
//! through here; see `services::backend`.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::{
        folder::StaticFolder,
        static_file::{FileType, ResolvedFile, StaticFile},
    },
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction, sqlite::SqliteExecutor};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const FOLDER_COLUMNS: &str = "id, folder_name, description, uses_object_store, access_key, \
     secret_key, bucket_name, region, cdn_host, object_key_prefix, allow_large_uploads, \
     upload_form_ttl_secs, created_at";

const FILE_COLUMNS: &str =
    "id, folder_id, name, file_type, remote_url, is_large_file, created_at";

/// Run the embedded schema statements. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> sqlx::Result<()> {
    let statements = MIGRATION_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct Catalog {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl Catalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn begin(&self) -> ServiceResult<Transaction<'static, Sqlite>> {
        Ok(self.db.begin().await?)
    }

    pub async fn insert_folder(&self, folder: &StaticFolder) -> ServiceResult<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO folders ({FOLDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(folder.id)
        .bind(&folder.folder_name)
        .bind(&folder.description)
        .bind(folder.uses_object_store)
        .bind(&folder.access_key)
        .bind(&folder.secret_key)
        .bind(&folder.bucket_name)
        .bind(&folder.region)
        .bind(&folder.cdn_host)
        .bind(&folder.object_key_prefix)
        .bind(folder.allow_large_uploads)
        .bind(folder.upload_form_ttl_secs)
        .bind(folder.created_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(ServiceError::AlreadyExists(format!(
                "folder `{}`",
                folder.folder_name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Overwrite every editable column of an existing folder.
    pub async fn update_folder<'e, E>(executor: E, folder: &StaticFolder) -> ServiceResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE folders SET folder_name = ?, description = ?, uses_object_store = ?,
                    access_key = ?, secret_key = ?, bucket_name = ?, region = ?, cdn_host = ?,
                    object_key_prefix = ?, allow_large_uploads = ?, upload_form_ttl_secs = ?
             WHERE id = ?",
        )
        .bind(&folder.folder_name)
        .bind(&folder.description)
        .bind(folder.uses_object_store)
        .bind(&folder.access_key)
        .bind(&folder.secret_key)
        .bind(&folder.bucket_name)
        .bind(&folder.region)
        .bind(&folder.cdn_host)
        .bind(&folder.object_key_prefix)
        .bind(folder.allow_large_uploads)
        .bind(folder.upload_form_ttl_secs)
        .bind(folder.id)
        .execute(executor)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(ServiceError::folder_not_found(folder.id)),
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(ServiceError::AlreadyExists(format!(
                "folder `{}`",
                folder.folder_name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn fetch_folder(&self, id: Uuid) -> ServiceResult<StaticFolder> {
        sqlx::query_as::<_, StaticFolder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::folder_not_found(id))
    }

    /// All folders ordered by name, optionally only those whose
    /// `uses_object_store` equals the filter.
    pub async fn list_folders(
        &self,
        uses_object_store: Option<bool>,
    ) -> ServiceResult<Vec<StaticFolder>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {FOLDER_COLUMNS} FROM folders"));
        if let Some(flag) = uses_object_store {
            builder.push(" WHERE uses_object_store = ");
            builder.push_bind(flag);
        }
        builder.push(" ORDER BY folder_name ASC");

        Ok(builder.build_query_as().fetch_all(&*self.db).await?)
    }

    pub async fn count_files_of_type(
        &self,
        folder_id: Uuid,
        file_type: FileType,
    ) -> ServiceResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM static_files WHERE folder_id = ? AND file_type = ?",
        )
        .bind(folder_id)
        .bind(file_type)
        .fetch_one(&*self.db)
        .await?)
    }

    /// Insert a file record through any executor, so callers can pair the
    /// insert with a content write inside one transaction.
    pub async fn insert_file<'e, E>(executor: E, file: &StaticFile) -> ServiceResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(&format!(
            "INSERT INTO static_files ({FILE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(file.id)
        .bind(file.folder_id)
        .bind(&file.name)
        .bind(file.file_type)
        .bind(&file.remote_url)
        .bind(file.is_large_file)
        .bind(file.created_at)
        .execute(executor)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(ServiceError::AlreadyExists(format!(
                "file `{}`",
                file.name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn fetch_file(&self, id: Uuid) -> ServiceResult<StaticFile> {
        sqlx::query_as::<_, StaticFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM static_files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::file_not_found(id))
    }

    /// Load a file together with a fresh snapshot of its folder.
    pub async fn fetch_resolved(&self, id: Uuid) -> ServiceResult<ResolvedFile> {
        let file = self.fetch_file(id).await?;
        let folder = self.fetch_folder(file.folder_id).await?;
        Ok(ResolvedFile::new(file, folder))
    }

    /// Look a file up by folder name and file name.
    pub async fn find_resolved(&self, folder_name: &str, name: &str) -> ServiceResult<ResolvedFile> {
        let file = sqlx::query_as::<_, StaticFile>(
            "SELECT f.id, f.folder_id, f.name, f.file_type, f.remote_url, f.is_large_file,
                    f.created_at
             FROM static_files f JOIN folders d ON d.id = f.folder_id
             WHERE d.folder_name = ? AND f.name = ?",
        )
        .bind(folder_name)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::FileNotFound(format!("{}/{}", folder_name, name)))?;
        let folder = self.fetch_folder(file.folder_id).await?;
        Ok(ResolvedFile::new(file, folder))
    }

    pub async fn update_file(&self, file: &StaticFile) -> ServiceResult<()> {
        let result =
            sqlx::query("UPDATE static_files SET file_type = ?, remote_url = ? WHERE id = ?")
                .bind(file.file_type)
                .bind(&file.remote_url)
                .bind(file.id)
                .execute(&*self.db)
                .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::file_not_found(file.id));
        }
        Ok(())
    }

    /// Flag a file as large. There is no way back.
    pub async fn mark_large(&self, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("UPDATE static_files SET is_large_file = 1 WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::file_not_found(id));
        }
        Ok(())
    }

    pub async fn delete_file<'e, E>(executor: E, id: Uuid) -> ServiceResult<()>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM static_files WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::file_not_found(id));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        folder::tests::{local_folder, s3_folder},
        static_file::tests::file_in,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_catalog() -> Catalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        Catalog::new(Arc::new(pool))
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let catalog = memory_catalog().await;
        run_migrations(&catalog.db).await.unwrap();
    }

    #[tokio::test]
    async fn folder_round_trip() {
        let catalog = memory_catalog().await;
        let folder = s3_folder();
        catalog.insert_folder(&folder).await.unwrap();

        let loaded = catalog.fetch_folder(folder.id).await.unwrap();
        assert_eq!(loaded.folder_name, folder.folder_name);
        assert_eq!(loaded.secret_key, folder.secret_key);
        assert!(loaded.uses_object_store);
        assert_eq!(loaded.upload_form_ttl_secs, 600);
    }

    #[tokio::test]
    async fn duplicate_folder_names_conflict() {
        let catalog = memory_catalog().await;
        catalog.insert_folder(&s3_folder()).await.unwrap();
        let err = catalog.insert_folder(&s3_folder()).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn list_filters_on_object_store_flag() {
        let catalog = memory_catalog().await;
        catalog.insert_folder(&s3_folder()).await.unwrap();
        catalog.insert_folder(&local_folder()).await.unwrap();

        let all = catalog.list_folders(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let s3 = catalog.list_folders(Some(true)).await.unwrap();
        assert_eq!(s3.len(), 1);
        assert_eq!(s3[0].folder_name, "s3store");
        let local = catalog.list_folders(Some(false)).await.unwrap();
        assert_eq!(local[0].folder_name, "media");
    }

    #[tokio::test]
    async fn file_round_trip_and_mark_large() {
        let catalog = memory_catalog().await;
        let folder = s3_folder();
        catalog.insert_folder(&folder).await.unwrap();
        let file = file_in(&folder, "video.mp4", FileType::S3);
        Catalog::insert_file(&*catalog.db, &file).await.unwrap();

        let resolved = catalog.fetch_resolved(file.id).await.unwrap();
        assert_eq!(resolved.file.file_type, FileType::S3);
        assert!(!resolved.file.is_large_file);
        assert_eq!(resolved.folder.id, folder.id);

        catalog.mark_large(file.id).await.unwrap();
        catalog.mark_large(file.id).await.unwrap();
        assert!(catalog.fetch_file(file.id).await.unwrap().is_large_file);

        let found = catalog.find_resolved("s3store", "video.mp4").await.unwrap();
        assert_eq!(found.file.id, file.id);
        assert_eq!(
            catalog.count_files_of_type(folder.id, FileType::S3).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn deleting_unknown_file_is_not_found() {
        let catalog = memory_catalog().await;
        let err = Catalog::delete_file(&*catalog.db, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::FileNotFound(_)));
    }
}
