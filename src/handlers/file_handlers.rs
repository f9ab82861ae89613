//! HTTP handlers for static files: registration, content and the large-file
//! upload action.

use crate::{
    errors::AppError,
    models::static_file::{FileInput, FileUpdate, FileView},
    services::{backend::FileContent, static_file_service::StaticFileService},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

const WARNING_HEADER: HeaderName = HeaderName::from_static("x-static-file-warning");

/// `POST /files`
pub async fn create_file(
    State(service): State<StaticFileService>,
    Json(input): Json<FileInput>,
) -> Result<impl IntoResponse, AppError> {
    let file = service.create_file(input).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// `GET /files/{id}`: the record with its derived `is_s3_bucket`, `s3_key`
/// and `url`.
pub async fn get_file(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileView>, AppError> {
    Ok(Json(service.get_file(id).await?))
}

/// `PATCH /files/{id}`: switch the file to another backend.
pub async fn update_file(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
    Json(update): Json<FileUpdate>,
) -> Result<Json<FileView>, AppError> {
    Ok(Json(service.change_file_type(id, update).await?))
}

/// `DELETE /files/{id}`
pub async fn delete_file(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_file(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /files/{id}/content`
pub async fn get_content(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let content = service.get_content(id).await?;
    Ok(content_response(content, None))
}

/// `PUT /files/{id}/content`
pub async fn put_content(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    service.set_content(id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /files/{id}/upload-credentials`
///
/// Marks the file as large and redirects the browser to the uploader page
/// carrying the signed form.
pub async fn issue_upload_credentials(
    State(service): State<StaticFileService>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let issued = service.issue_upload_credentials(id).await?;
    let location = HeaderValue::from_str(&issued.redirect_url)
        .map_err(|err| AppError::internal(err.to_string()))?;

    let body = Json(json!({
        "redirect_url": issued.redirect_url,
        "form": issued.form,
    }));
    let mut response = (StatusCode::SEE_OTHER, body).into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// `GET /static-file/{folder}/{*name}`: serve a local file by name.
pub async fn serve_static_file(
    State(service): State<StaticFileService>,
    Path((folder, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let content = service.serve_local(&folder, &name).await?;
    Ok(content_response(content, Some(&name)))
}

fn content_response(content: FileContent, name: Option<&str>) -> Response {
    let content_type = name
        .and_then(guess_content_type)
        .unwrap_or("application/octet-stream");

    let mut response = Response::new(axum::body::Body::from(content.bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    for warning in &content.warnings {
        if let Ok(value) = HeaderValue::from_str(&warning.to_string()) {
            headers.append(WARNING_HEADER, value);
        }
    }
    response
}

fn guess_content_type(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "css" => "text/css",
        "js" => "text/javascript",
        "html" => "text/html",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}
