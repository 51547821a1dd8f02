//! Defines the routes of the edital panel.
//!
//! ## Structure
//! - **Panel**
//!   - `GET  /`: upload form + document listing
//!   - `POST /upload`: upload one PDF with a description
//!   - `POST /delete/{id}`: delete a document and its file
//!   - `GET  /uploads/{filename}`: raw PDF download
//!
//! - **Probes**
//!   - `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        document_handlers::{delete_document, index, serve_file, upload_document},
        health_handlers::{healthz, readyz},
    },
    services::{document_service::DocumentService, file_store::MAX_UPLOAD_BYTES},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries, part headers and the description.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the router for all panel routes.
///
/// The router carries shared state (`DocumentService`) to all handlers.
pub fn routes() -> Router<DocumentService> {
    Router::new()
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // panel
        .route("/", get(index))
        .route(
            "/upload",
            post(upload_document).layer(DefaultBodyLimit::max(
                MAX_UPLOAD_BYTES as usize + FORM_OVERHEAD_BYTES,
            )),
        )
        .route("/delete/{id}", post(delete_document))
        .route("/uploads/{filename}", get(serve_file))
}

/// The full application: routes, request tracing and state.
pub fn app(service: DocumentService) -> Router {
    routes()
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
