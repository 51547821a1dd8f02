//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the documents table and the storage directory

use crate::services::document_service::DocumentService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE_CONTENT: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Liveness probe; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 1. Counts rows in `documents` (proves the pool and the schema).
/// 2. Writes, reads back and deletes a probe file in the storage directory.
///
/// HTTP 200 when both pass, 503 otherwise.
pub async fn readyz(State(service): State<DocumentService>) -> impl IntoResponse {
    let database = check_database(&service).await;
    let storage = check_storage(service.files.base_path()).await;
    let ready = database.ok && storage.ok;

    let checks = BTreeMap::from([("database", database), ("storage", storage)]);
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        checks,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_database(service: &DocumentService) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents")
        .fetch_one(&*service.db)
        .await
    {
        Ok(_) => CheckStatus::passed(),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    }
}

async fn check_storage(base_path: &Path) -> CheckStatus {
    // Dot-prefixed so listings and the file route never see it.
    let probe = base_path.join(format!(".readyz-{}", Uuid::new_v4()));

    if let Err(e) = fs::write(&probe, PROBE_CONTENT).await {
        return CheckStatus::failed(format!("could not write probe file: {}", e));
    }
    let read_back = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;

    match (read_back, removed) {
        (Ok(bytes), _) if bytes != PROBE_CONTENT => {
            CheckStatus::failed("probe file content mismatch".to_string())
        }
        (Ok(_), Ok(())) => CheckStatus::passed(),
        (Ok(_), Err(e)) => CheckStatus {
            ok: true,
            error: Some(format!("could not remove probe file: {}", e)),
        },
        (Err(e), _) => CheckStatus::failed(format!("could not read probe file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn passed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
