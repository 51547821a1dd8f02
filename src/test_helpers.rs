//! Shared fixtures for handler and service tests.

use crate::{
    db,
    routes::routes,
    services::{
        document_service::{DocumentError, DocumentService},
        file_store::{FileStore, StagedUpload},
    },
};
use axum::{
    Router,
    body::Body,
    http::{Request, header},
    response::Response,
};
use bytes::Bytes;
use futures::stream;
use sqlx::sqlite::SqlitePoolOptions;
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "edital-panel-test-boundary";

/// An in-memory database plus a temporary storage directory.
pub struct TestContext {
    pub service: DocumentService,
    dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        // A single connection that never expires: each connection to
        // `sqlite::memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let dir = TempDir::new().unwrap();
        let service = DocumentService::new(Arc::new(pool), FileStore::new(dir.path()));
        Self { service, dir }
    }

    pub fn storage_path(&self) -> &Path {
        self.dir.path()
    }

    /// Every entry in the storage directory, staging files included.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn app(&self) -> Router {
        routes::app(self.service.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app().oneshot(request).await.unwrap()
    }
}

/// Stage `bytes` as a single-chunk upload.
pub async fn stage_bytes(files: &FileStore, bytes: &'static [u8]) -> StagedUpload {
    let chunks = stream::iter(vec![Ok::<_, DocumentError>(Bytes::from_static(bytes))]);
    files.stage(chunks).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}
