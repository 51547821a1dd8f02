//! HTTP handlers for the document panel.
//! Uploads are streamed straight to the storage directory; payloads are
//! streamed back out without buffering. Storage concerns live in
//! `DocumentService`.

use crate::{
    errors::AppError,
    models::document::NewDocument,
    services::{
        document_service::{DocumentError, DocumentService},
        file_store::{MAX_UPLOAD_BYTES, StagedUpload},
    },
    views,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Multipart part carrying the PDF.
pub const FILE_FIELD: &str = "pdfFile";
/// Multipart part carrying the free-text description.
pub const DESCRIPTION_FIELD: &str = "description";

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// `GET /`: upload form and the list of documents, newest first.
pub async fn index(State(service): State<DocumentService>) -> Result<Html<String>, AppError> {
    let documents = service.list_documents().await?;
    Ok(Html(views::render_index(&documents)?))
}

/// `POST /upload`: accept one PDF plus a description.
///
/// The content type is checked before any byte is written, and the size
/// ceiling is enforced while streaming into the staging file.
pub async fn upload_document(
    State(service): State<DocumentService>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload: Option<(StagedUpload, String)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            FILE_FIELD => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                // Browsers send an empty, nameless part when no file was chosen.
                if original_name.is_empty() {
                    debug!("Ignoring file part without a filename");
                    continue;
                }
                if upload.is_some() {
                    return Err(
                        DocumentError::MalformedUpload("only one file may be uploaded".into())
                            .into(),
                    );
                }

                let content_type = field.content_type().unwrap_or_default().to_string();
                if !is_pdf(&content_type) {
                    let received = if content_type.is_empty() {
                        "unknown".to_string()
                    } else {
                        content_type
                    };
                    return Err(DocumentError::NotPdf(received).into());
                }

                let stream = field.map(|chunk| chunk.map_err(upload_error));
                let staged = service.files.stage(stream).await?;
                upload = Some((staged, original_name));
            }
            DESCRIPTION_FIELD => {
                description = Some(field.text().await.map_err(upload_error)?);
            }
            other => debug!("Ignoring unknown field: {}", other),
        }
    }

    let (staged, original_name) = upload.ok_or(DocumentError::MissingFile)?;
    service
        .create_document(staged, NewDocument::new(original_name, description))
        .await?;

    Ok(redirect_to_index())
}

/// `POST /delete/{id}`: remove a document row and its payload.
pub async fn delete_document(
    State(service): State<DocumentService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = id
        .parse::<i64>()
        .map_err(|_| DocumentError::InvalidId(id.clone()))?;

    service.delete_document(id).await?;
    Ok(redirect_to_index())
}

/// `GET /uploads/{filename}`: stream a stored PDF.
pub async fn serve_file(
    State(service): State<DocumentService>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let (file, len) = service.open_file(&filename).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PDF_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline"),
    );
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// `302 Found` back to the listing.
fn redirect_to_index() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

/// Compare the MIME essence, ignoring case and parameters.
fn is_pdf(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
}

/// Multipart failures are client errors; a tripped body limit means the
/// payload was too large.
fn upload_error(err: MultipartError) -> DocumentError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DocumentError::TooLarge {
            limit_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
        }
    } else {
        DocumentError::MalformedUpload(err.body_text())
    }
}
