//! src/services/document_service.rs
//!
//! DocumentService: the upload/list/delete operations of the panel, backed
//! by SQLite for document metadata and a [`FileStore`] for PDF payloads.
//!
//! The two stores are not transactionally linked. Creation writes the file
//! first and records the row second; deletion removes the row first and
//! unlinks the file second. `reconcile` reports whatever a crash between the
//! two steps left behind.

use crate::models::document::{Document, NewDocument};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    collections::{BTreeSet, HashSet},
    io::{self, ErrorKind},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info, warn};

use super::file_store::{FileStore, StagedUpload};

const DOCUMENT_COLUMNS: &str =
    "id, original_name, stored_name, description, size_bytes, checksum, uploaded_at";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("no file uploaded")]
    MissingFile,
    #[error("uploaded file is empty")]
    EmptyFile,
    #[error("only PDF files are allowed (received `{0}`)")]
    NotPdf(String),
    #[error("file too large (limit: {limit_mb} MB)")]
    TooLarge { limit_mb: u64 },
    #[error("malformed upload: {0}")]
    MalformedUpload(String),
    #[error("invalid document id `{0}`")]
    InvalidId(String),
    #[error("document {0} not found")]
    DocumentNotFound(i64),
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error("stored name `{0}` is already recorded")]
    DuplicateStoredName(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Differences between the `documents` table and the storage directory.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Payloads on disk with no row.
    pub orphaned_files: Vec<String>,
    /// Rows whose payload is gone.
    pub missing_files: Vec<Document>,
    /// Whether the differences were repaired.
    pub pruned: bool,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_files.is_empty() && self.missing_files.is_empty()
    }
}

/// Shared state of every request handler.
#[derive(Clone)]
pub struct DocumentService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Storage directory for PDF payloads.
    pub files: FileStore,
}

impl DocumentService {
    pub fn new(db: Arc<SqlitePool>, files: FileStore) -> Self {
        Self { db, files }
    }

    /// All documents, newest first.
    pub async fn list_documents(&self) -> DocumentResult<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id DESC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(documents)
    }

    /// Store a staged upload under a fresh name and record it.
    ///
    /// If the insert fails the freshly linked payload is removed best-effort;
    /// a payload that survives is reported by [`DocumentService::reconcile`].
    pub async fn create_document(
        &self,
        staged: StagedUpload,
        new_doc: NewDocument,
    ) -> DocumentResult<Document> {
        let stored_name = self.files.commit(&staged, &new_doc.original_name).await?;

        let insert_result = sqlx::query_as::<_, Document>(&format!(
            "INSERT INTO documents (
                original_name, stored_name, description, size_bytes, checksum, uploaded_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(&new_doc.original_name)
        .bind(&stored_name)
        .bind(&new_doc.description)
        .bind(staged.size_bytes())
        .bind(staged.checksum())
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;
        staged.discard().await;

        match insert_result {
            Ok(document) => {
                info!(
                    id = document.id,
                    stored_name = %document.stored_name,
                    size_bytes = document.size_bytes,
                    "stored document"
                );
                Ok(document)
            }
            Err(err) => {
                if let Err(remove_err) = self.files.remove(&stored_name).await {
                    warn!(
                        "insert failed and payload {} could not be removed: {}",
                        stored_name, remove_err
                    );
                }
                if is_unique_violation(&err) {
                    Err(DocumentError::DuplicateStoredName(stored_name))
                } else {
                    Err(DocumentError::Sqlx(err))
                }
            }
        }
    }

    /// Delete a document row, then unlink its payload.
    ///
    /// The row is authoritative: once it is gone the call succeeds even if
    /// the payload cannot be removed. A second delete of the same id returns
    /// `DocumentNotFound`.
    pub async fn delete_document(&self, id: i64) -> DocumentResult<Document> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "DELETE FROM documents WHERE id = ? RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(DocumentError::DocumentNotFound(id))?;

        match self.files.remove(&document.stored_name).await {
            Ok(()) => debug!("removed payload {}", document.stored_name),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", document.stored_name);
            }
            Err(err) => warn!(
                "document {} deleted but payload {} could not be removed: {}",
                id, document.stored_name, err
            ),
        }

        Ok(document)
    }

    /// Open a stored payload for streaming.
    pub async fn open_file(&self, stored_name: &str) -> DocumentResult<(File, u64)> {
        self.files.open(stored_name).await
    }

    /// Compare rows against the storage directory.
    ///
    /// With `prune`, orphaned payloads are removed and rows whose payload is
    /// missing are deleted. Meant to run while no uploads are in flight: a
    /// payload linked but not yet recorded looks orphaned.
    pub async fn reconcile(&self, prune: bool) -> DocumentResult<ReconcileReport> {
        let documents = self.list_documents().await?;
        let on_disk: BTreeSet<String> = self.files.list_payloads().await?.into_iter().collect();
        let recorded: HashSet<&str> = documents.iter().map(|d| d.stored_name.as_str()).collect();

        let orphaned_files: Vec<String> = on_disk
            .iter()
            .filter(|name| !recorded.contains(name.as_str()))
            .cloned()
            .collect();
        let missing_files: Vec<Document> = documents
            .iter()
            .filter(|doc| !on_disk.contains(&doc.stored_name))
            .cloned()
            .collect();

        if prune {
            for name in &orphaned_files {
                match self.files.remove(name).await {
                    Ok(()) => info!("pruned orphaned payload {}", name),
                    Err(err) => warn!("failed to prune orphaned payload {}: {}", name, err),
                }
            }
            for doc in &missing_files {
                sqlx::query("DELETE FROM documents WHERE id = ?")
                    .bind(doc.id)
                    .execute(&*self.db)
                    .await?;
                info!(
                    "pruned document {} ({}) with missing payload",
                    doc.id, doc.stored_name
                );
            }
        }

        Ok(ReconcileReport {
            orphaned_files,
            missing_files,
            pruned: prune,
        })
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
mod tests {
    use super::*;
    use crate::models::document::DESCRIPTION_PLACEHOLDER;
    use crate::test_helpers::{TestContext, stage_bytes};

    async fn upload(ctx: &TestContext, name: &str, description: Option<&str>) -> Document {
        let staged = stage_bytes(&ctx.service.files, b"%PDF-1.4 test").await;
        ctx.service
            .create_document(staged, NewDocument::new(name, description.map(str::to_string)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_records_row_and_payload() {
        let ctx = TestContext::new().await;
        let doc = upload(&ctx, "edital.pdf", Some("Concurso 2024")).await;

        assert_eq!(doc.original_name, "edital.pdf");
        assert_eq!(doc.description, "Concurso 2024");
        assert_eq!(doc.size_bytes, 13);
        assert!(doc.stored_name.starts_with("edital-"));
        assert!(ctx.storage_path().join(&doc.stored_name).is_file());
        assert_eq!(ctx.stored_files(), vec![doc.stored_name.clone()]);
    }

    #[tokio::test]
    async fn missing_description_is_recorded_as_placeholder() {
        let ctx = TestContext::new().await;
        let doc = upload(&ctx, "edital.pdf", None).await;
        assert_eq!(doc.description, DESCRIPTION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let ctx = TestContext::new().await;
        let first = upload(&ctx, "a.pdf", None).await;
        let second = upload(&ctx, "b.pdf", None).await;
        let third = upload(&ctx, "a.pdf", None).await;

        let ids: Vec<i64> = ctx
            .service
            .list_documents()
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert_ne!(first.stored_name, third.stored_name);
    }

    #[tokio::test]
    async fn delete_removes_row_and_payload_once() {
        let ctx = TestContext::new().await;
        let doc = upload(&ctx, "edital.pdf", None).await;

        let deleted = ctx.service.delete_document(doc.id).await.unwrap();
        assert_eq!(deleted, doc);
        assert!(ctx.service.list_documents().await.unwrap().is_empty());
        assert!(ctx.stored_files().is_empty());

        let err = ctx.service.delete_document(doc.id).await.unwrap_err();
        assert!(matches!(err, DocumentError::DocumentNotFound(id) if id == doc.id));
    }

    #[tokio::test]
    async fn delete_succeeds_when_payload_already_gone() {
        let ctx = TestContext::new().await;
        let doc = upload(&ctx, "edital.pdf", None).await;
        std::fs::remove_file(ctx.storage_path().join(&doc.stored_name)).unwrap();

        ctx.service.delete_document(doc.id).await.unwrap();
        assert!(ctx.service.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_removes_written_payload() {
        let ctx = TestContext::new().await;
        sqlx::query("DROP TABLE documents")
            .execute(&*ctx.service.db)
            .await
            .unwrap();

        let staged = stage_bytes(&ctx.service.files, b"%PDF-1.4 test").await;
        let err = ctx
            .service
            .create_document(staged, NewDocument::new("edital.pdf", None))
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentError::Sqlx(_)));
        assert!(ctx.stored_files().is_empty());
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let ctx = TestContext::new().await;
        let first = upload(&ctx, "a.pdf", None).await;
        ctx.service.delete_document(first.id).await.unwrap();
        let second = upload(&ctx, "a.pdf", None).await;
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn reconcile_reports_and_prunes_drift() {
        let ctx = TestContext::new().await;
        let kept = upload(&ctx, "kept.pdf", None).await;
        let lost = upload(&ctx, "lost.pdf", None).await;
        std::fs::remove_file(ctx.storage_path().join(&lost.stored_name)).unwrap();
        std::fs::write(ctx.storage_path().join("legacy-1700000000000.pdf"), b"%PDF").unwrap();

        let report = ctx.service.reconcile(false).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.orphaned_files, vec!["legacy-1700000000000.pdf".to_string()]);
        assert_eq!(report.missing_files, vec![lost.clone()]);
        assert_eq!(ctx.service.list_documents().await.unwrap().len(), 2);

        let report = ctx.service.reconcile(true).await.unwrap();
        assert!(report.pruned);
        assert_eq!(ctx.service.list_documents().await.unwrap(), vec![kept.clone()]);
        assert_eq!(ctx.stored_files(), vec![kept.stored_name.clone()]);

        assert!(ctx.service.reconcile(false).await.unwrap().is_consistent());
    }
}
