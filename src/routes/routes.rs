//! Defines routes for folder and static file operations.
//!
//! ## Structure
//! - **Folder endpoints**
//!   - `POST   /folders` — create folder
//!   - `GET    /folders` — list folders (supports uses_object_store, file_type)
//!   - `GET    /folders/{id}` — fetch folder
//!   - `PUT    /folders/{id}` — edit folder
//!
//! - **File endpoints**
//!   - `POST   /files` — register file, optionally with inline content
//!   - `GET    /files/{id}` — record with derived key and URL
//!   - `PATCH  /files/{id}` — change file type
//!   - `DELETE /files/{id}` — remove content and record
//!   - `GET    /files/{id}/content` — read content
//!   - `PUT    /files/{id}/content` — write content
//!   - `POST   /files/{id}/upload-credentials` — large-file upload redirect
//!
//! - **Local file serving**
//!   - `GET    /static-file/{folder}/{*name}`

use crate::{
    handlers::{
        file_handlers::{
            create_file, delete_file, get_content, get_file, issue_upload_credentials,
            put_content, serve_static_file, update_file,
        },
        folder_handlers::{create_folder, get_folder, list_folders, update_folder},
        health_handlers::{healthz, readyz},
    },
    services::static_file_service::StaticFileService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`StaticFileService`) to all handlers.
pub fn routes() -> Router<StaticFileService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Folder routes
        .route("/folders", post(create_folder).get(list_folders))
        .route("/folders/{id}", get(get_folder).put(update_folder))
        // File routes
        .route("/files", post(create_file))
        .route(
            "/files/{id}",
            get(get_file).patch(update_file).delete(delete_file),
        )
        .route("/files/{id}/content", get(get_content).put(put_content))
        .route(
            "/files/{id}/upload-credentials",
            post(issue_upload_credentials),
        )
        .route("/static-file/{folder}/{*name}", get(serve_static_file))
}
