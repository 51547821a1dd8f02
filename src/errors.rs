use crate::{services::document_service::DocumentError, views};
use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match views::render_error(self.status.as_u16(), &self.message) {
            Ok(page) => (self.status, Html(page)).into_response(),
            Err(err) => {
                tracing::error!("failed to render error page: {}", err);
                (
                    self.status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    self.message,
                )
                    .into_response()
            }
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::MissingFile
            | DocumentError::EmptyFile
            | DocumentError::NotPdf(_)
            | DocumentError::TooLarge { .. }
            | DocumentError::MalformedUpload(_)
            | DocumentError::InvalidId(_) => AppError::bad_request(err.to_string()),
            DocumentError::DocumentNotFound(_) | DocumentError::FileNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            DocumentError::DuplicateStoredName(_) => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            DocumentError::Sqlx(ref e) => {
                tracing::error!("Database error: {:?}", e);
                AppError::internal("database error")
            }
            DocumentError::Io(ref e) => {
                tracing::error!("Storage error: {:?}", e);
                AppError::internal("storage error")
            }
        }
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        tracing::error!("Template error: {:?}", err);
        AppError::internal("failed to render page")
    }
}
