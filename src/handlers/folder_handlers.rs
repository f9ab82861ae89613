//! HTTP handlers for folder configuration.

use crate::{
    errors::AppError,
    models::{folder::FolderInput, folder::StaticFolder, static_file::FileType},
    services::static_file_service::StaticFileService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

/// Filters accepted by `GET /folders`.
#[derive(Debug, Deserialize)]
pub struct ListFoldersQuery {
    pub uses_object_store: Option<bool>,
    /// Only folders a file of this type may be placed in.
    pub file_type: Option<FileType>,
}

/// `POST /folders`
pub async fn create_folder(
    State(service): State<StaticFileService>,
    Json(input): Json<FolderInput>,
) -> Result<impl IntoResponse, AppError> {
    let folder = service.create_folder(input).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// `GET /folders`
pub async fn list_folders(
    State(service): State<StaticFileService>,
    Query(q): Query<ListFoldersQuery>,
) -> Result<Json<Vec<StaticFolder>>, AppError> {
    let folders = match q.file_type {
        Some(file_type) => service.folder_choices(file_type).await?,
        None => service.list_folders(q.uses_object_store).await?,
    };
    Ok(Json(folders))
}

/// `GET /folders/{id}`
pub async fn get_folder(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
) -> Result<Json<StaticFolder>, AppError> {
    Ok(Json(service.get_folder(id).await?))
}

/// `PUT /folders/{id}`
pub async fn update_folder(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
    Json(input): Json<FolderInput>,
) -> Result<Json<StaticFolder>, AppError> {
    Ok(Json(service.update_folder(id, input).await?))
}
