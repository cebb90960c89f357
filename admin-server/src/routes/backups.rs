use crate::auth::AdminUser;
use crate::error::AppError;
use crate::models::admin_log::AuditAction;
use crate::models::backup;
use crate::services::backup_service;
use crate::state::AppState;
use crate::ws::progress::OperationProgress;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use backup_core::{ArtifactFormat, BackupKind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const MAX_OPERATION_ID_LEN: usize = 64;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route("/upload", post(upload_backup))
        .route("/system-status", get(system_status))
        .route("/media-stats", get(media_stats))
        .route("/progress/{operation_id}", get(get_progress))
        .route("/ws", get(crate::ws::progress::ws_handler))
        .route("/{id}", delete(delete_backup))
        .route("/{id}/download", get(download_backup))
        .route("/{id}/restore", post(restore_backup))
}

/// Client-supplied operation id, or a fresh one.
fn operation_id(requested: Option<String>) -> Result<String, AppError> {
    match requested.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        None => Ok(Uuid::new_v4().to_string()),
        Some(id)
            if id.len() <= MAX_OPERATION_ID_LEN
                && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            Ok(id)
        }
        Some(_) => Err(AppError::BadRequest("Invalid operation id".into())),
    }
}

// ── List ──

async fn list_backups(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let db = state.db.clone();
    let backups = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup::find_all(&conn)
    })
    .await??;
    Ok(Json(json!({ "success": true, "backups": backups })))
}

// ── Create ──

fn default_kind() -> BackupKind {
    BackupKind::Database
}

#[derive(Deserialize)]
struct CreateBackupRequest {
    #[serde(rename = "type", default = "default_kind")]
    kind: BackupKind,
    custom_name: Option<String>,
    operation_id: Option<String>,
}

async fn create_backup(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBackupRequest>,
) -> Result<Json<Value>, AppError> {
    let operation_id = operation_id(req.operation_id)?;
    tracing::info!(
        "[Export] {} requested a {} backup (operation {})",
        admin.username,
        req.kind,
        operation_id
    );
    state.progress.begin(&operation_id, "Starting backup...");

    let st = state.clone();
    let op = operation_id.clone();
    let created = tokio::task::spawn_blocking(move || {
        let sink = st.progress.sink(&op);
        let result = backup_service::create_backup(
            &st.manager(),
            &st.db,
            req.kind,
            req.custom_name.as_deref(),
            Some(admin.id),
            Some(&sink),
        );
        match &result {
            Ok(c) => {
                backup_service::audit(
                    &st.db,
                    &admin,
                    AuditAction::BackupCreated,
                    None,
                    &c.backup.name,
                    Some(c.backup.id),
                );
                st.progress.finish(&op, true, "Backup created successfully");
            }
            Err(e) => {
                let msg = e.to_string();
                backup_service::audit(&st.db, &admin, AuditAction::BackupCreated, Some(&msg), req.kind.as_str(), None);
                st.progress.finish(&op, false, &format!("Backup failed: {}", msg));
            }
        }
        result
    })
    .await??;

    Ok(Json(json!({
        "success": true,
        "operation_id": operation_id,
        "message": format!("Backup {} created", created.backup.name),
        "backup": created.backup,
        "report": created.report,
    })))
}

// ── Upload ──

async fn upload_backup(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("backup_file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no name".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some((name, data));
        break;
    }
    let (name, data) = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let st = state.clone();
    let record = tokio::task::spawn_blocking(move || {
        let result = backup_service::store_upload(&st.manager(), &st.db, &name, &data, Some(admin.id));
        match &result {
            Ok(r) => backup_service::audit(&st.db, &admin, AuditAction::BackupUploaded, None, &r.name, Some(r.id)),
            Err(e) => backup_service::audit(
                &st.db,
                &admin,
                AuditAction::BackupUploaded,
                Some(&e.to_string()),
                &name,
                None,
            ),
        }
        result
    })
    .await??;

    Ok(Json(json!({
        "success": true,
        "message": format!("Backup {} uploaded", record.name),
        "backup": record,
    })))
}

// ── Download ──

async fn download_backup(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || backup_service::find_backup(&db, id)).await??;

    let read = tokio::fs::read(&record.file_path).await;
    let error = read.as_ref().err().map(|e| e.to_string());
    let db = state.db.clone();
    let (audited, details) = (admin.clone(), record.name.clone());
    tokio::task::spawn_blocking(move || {
        backup_service::audit(&db, &audited, AuditAction::BackupDownloaded, error.as_deref(), &details, Some(id))
    })
    .await?;

    let content = match read {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Backup file not found".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = match record.backup_type.format() {
        ArtifactFormat::Json => "application/json",
        ArtifactFormat::Zip => "application/zip",
    };
    let disposition = format!("attachment; filename=\"{}\"", record.name.replace('"', "_"));
    Ok((
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

// ── Delete ──

async fn delete_backup(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || {
        let result = backup_service::delete_backup(&db, id);
        let error = result.as_ref().err().map(|e| e.to_string());
        let details = result.as_ref().map(|r| r.name.clone()).unwrap_or_default();
        backup_service::audit(&db, &admin, AuditAction::BackupDeleted, error.as_deref(), &details, Some(id));
        result
    })
    .await??;

    Ok(Json(json!({
        "success": true,
        "message": format!("Backup {} deleted", record.name),
    })))
}

// ── Restore ──

#[derive(Deserialize)]
struct RestoreRequest {
    #[serde(default)]
    confirmed: bool,
    operation_id: Option<String>,
}

async fn restore_backup(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<RestoreRequest>,
) -> Result<Response, AppError> {
    if !req.confirmed {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "requires_confirmation": true,
                "error": "Restoring replaces current data and must be confirmed",
            })),
        )
            .into_response());
    }

    let operation_id = operation_id(req.operation_id)?;
    tracing::info!(
        "[Restore] {} requested restore of backup {} (operation {})",
        admin.username,
        id,
        operation_id
    );
    state.progress.begin(&operation_id, "Starting restore...");

    let st = state.clone();
    let op = operation_id.clone();
    let (record, report) = tokio::task::spawn_blocking(move || {
        let sink = st.progress.sink(&op);
        let result = backup_service::restore_backup(&st.manager(), &st.db, id, Some(&sink));
        match &result {
            Ok((record, report)) => {
                backup_service::audit(&st.db, &admin, AuditAction::BackupRestored, None, &record.name, Some(id));
                st.progress.finish(&op, true, &report.message);
            }
            Err(e) => {
                let msg = e.to_string();
                backup_service::audit(&st.db, &admin, AuditAction::BackupRestored, Some(&msg), "", Some(id));
                st.progress.finish(&op, false, &format!("Restore failed: {}", msg));
            }
        }
        result
    })
    .await??;

    Ok(Json(json!({
        "success": true,
        "operation_id": operation_id,
        "message": report.message,
        "backup": record,
        "report": report,
    }))
    .into_response())
}

// ── Progress ──

async fn get_progress(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Path(operation_id): Path<String>,
) -> Result<Json<OperationProgress>, AppError> {
    state
        .progress
        .get(&operation_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Unknown operation".into()))
}

// ── Introspection ──

async fn system_status(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let st = state.clone();
    let (info, connection) = tokio::task::spawn_blocking(move || {
        let manager = st.manager();
        (manager.system_info(), manager.test_connection())
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "system_info": info,
        "connection": connection,
    })))
}

async fn media_stats(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let st = state.clone();
    let stats = tokio::task::spawn_blocking(move || st.manager().media_stats()).await?;
    Ok(Json(json!({ "success": true, "media_stats": stats })))
}
