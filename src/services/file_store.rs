//! src/services/file_store.rs
//!
//! FileStore: the storage directory holding raw PDF payloads.
//!
//! Uploads are streamed into a hidden staging file (`.tmp-<uuid>`) beneath
//! `base_path`, fsynced, then hard-linked to their final stored name. The
//! link fails if the target exists, so a stored name is never overwritten.

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use super::document_service::{DocumentError, DocumentResult};

/// Upload ceiling: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const STAGING_PREFIX: &str = ".tmp-";
const PDF_EXTENSION: &str = ".pdf";
const FALLBACK_STEM: &str = "document";
const MAX_STEM_CHARS: usize = 100;
const MAX_STORED_NAME_LEN: usize = 255;
const MAX_NAME_ATTEMPTS: usize = 5;

#[derive(Clone, Debug)]
pub struct FileStore {
    /// Directory holding stored payloads and in-flight staging files.
    base_path: PathBuf,

    /// Largest accepted payload in bytes.
    max_bytes: u64,
}

/// An upload that has been fully written to a staging file but not yet
/// given its stored name.
///
/// Call [`StagedUpload::discard`] once the upload is settled. Dropping the
/// value without it still removes the staging file, with a blocking unlink.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    size_bytes: i64,
    checksum: String,
}

impl StagedUpload {
    pub fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Remove the staging file. A committed payload keeps its stored name.
    pub async fn discard(mut self) {
        let path = std::mem::take(&mut self.path);
        if let Err(err) = fs::remove_file(&path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to remove staging file {}: {}", path.display(), err);
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove staging file {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    #[cfg(test)]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Stream a payload into a staging file.
    ///
    /// - Enforces the size ceiling while streaming; an oversized payload
    ///   never reaches a stored name.
    /// - Computes the MD5 checksum and size as bytes arrive.
    /// - Flushes and fsyncs before returning.
    pub async fn stage<S, E>(&self, stream: S) -> DocumentResult<StagedUpload>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<DocumentError>,
    {
        fs::create_dir_all(&self.base_path).await?;
        let path = self
            .base_path
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        let mut file = File::create(&path).await?;
        let mut staged = StagedUpload {
            path,
            size_bytes: 0,
            checksum: String::new(),
        };

        let mut digest = Context::new();
        let mut written: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Into::<DocumentError>::into)?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(DocumentError::TooLarge {
                    limit_mb: self.max_bytes / (1024 * 1024),
                });
            }
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        if written == 0 {
            return Err(DocumentError::EmptyFile);
        }

        staged.size_bytes = written as i64;
        staged.checksum = format!("{:x}", digest.compute());
        Ok(staged)
    }

    /// Give a staged payload its stored name and return that name.
    ///
    /// A fresh disambiguation token is drawn when the candidate name is
    /// already taken on disk.
    pub async fn commit(
        &self,
        staged: &StagedUpload,
        original_name: &str,
    ) -> DocumentResult<String> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let stored_name = stored_name_for(original_name, &disambiguation_token());
            let target = self.base_path.join(&stored_name);
            match fs::hard_link(&staged.path, &target).await {
                Ok(()) => return Ok(stored_name),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!("stored name {} already taken, retrying", stored_name);
                }
                Err(err) => return Err(DocumentError::Io(err)),
            }
        }

        Err(DocumentError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "could not reserve a unique stored name",
        )))
    }

    /// Open a stored payload for streaming, returning the handle and its length.
    pub async fn open(&self, stored_name: &str) -> DocumentResult<(File, u64)> {
        let path = self
            .resolve(stored_name)
            .ok_or_else(|| DocumentError::FileNotFound(stored_name.to_string()))?;

        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                DocumentError::FileNotFound(stored_name.to_string())
            } else {
                DocumentError::Io(err)
            }
        })?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(DocumentError::FileNotFound(stored_name.to_string()));
        }

        Ok((file, meta.len()))
    }

    /// Remove a stored payload. Missing files surface as `NotFound` I/O errors.
    pub async fn remove(&self, stored_name: &str) -> io::Result<()> {
        let path = self.resolve(stored_name).ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "invalid stored name")
        })?;
        fs::remove_file(&path).await
    }

    /// List stored payload names. Staging files and non-PDF entries are skipped.
    pub async fn list_payloads(&self) -> DocumentResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(DocumentError::Io(err)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.resolve(&name).is_some() && has_pdf_extension(&name) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Map a stored name to its path, rejecting anything that could escape
    /// the storage directory or address a staging file.
    fn resolve(&self, stored_name: &str) -> Option<PathBuf> {
        if stored_name.is_empty()
            || stored_name.len() > MAX_STORED_NAME_LEN
            || stored_name.starts_with('.')
            || stored_name.contains(['/', '\\'])
            || stored_name.contains("..")
            || stored_name.chars().any(char::is_control)
        {
            return None;
        }
        Some(self.base_path.join(stored_name))
    }
}

/// Derive the stored name `<stem>-<token>.pdf` from a client-supplied name.
///
/// The stem is shortened so the whole name fits in `MAX_STORED_NAME_LEN`
/// bytes, the usual filesystem limit for a single path component.
pub fn stored_name_for(original_name: &str, token: &str) -> String {
    let stem_budget = MAX_STORED_NAME_LEN.saturating_sub(token.len() + PDF_EXTENSION.len() + 1);
    format!(
        "{}-{}{}",
        file_stem(original_name, stem_budget),
        token,
        PDF_EXTENSION
    )
}

/// Sanitized stem of a client-supplied filename: directory components and a
/// trailing `.pdf` dropped, unsafe characters replaced by `_`. Truncated on a
/// char boundary to at most `MAX_STEM_CHARS` chars and `max_bytes` bytes.
fn file_stem(original_name: &str, max_bytes: usize) -> String {
    let base = original_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_name);
    let base = if has_pdf_extension(base) {
        &base[..base.len() - PDF_EXTENSION.len()]
    } else {
        base
    };

    let mut stem = String::new();
    for c in base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_CHARS)
    {
        if stem.len() + c.len_utf8() > max_bytes {
            break;
        }
        stem.push(c);
    }

    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

fn has_pdf_extension(name: &str) -> bool {
    name.len()
        .checked_sub(PDF_EXTENSION.len())
        .and_then(|start| name.get(start..))
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PDF_EXTENSION))
}

/// `<unix-millis>-<8 hex chars>`: time-ordered, with a random component so
/// uploads within the same millisecond still differ.
fn disambiguation_token() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &random[..8])
}
