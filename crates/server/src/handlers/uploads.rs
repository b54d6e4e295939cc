//! Upload endpoint.
//!
//! Files are streamed into a fresh staging directory under
//! `server.upload_dir`. Options are validated and the base file checked
//! before any handler is consulted; a rejected request leaves nothing on disk.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{UPLOADS_ACCEPTED, record_upload_rejected};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use geoingest_core::files::ExecutionAccepted;
use geoingest_core::{FileRole, ImportOptions, UploadFiles, parse_bool_option};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Form field carrying the keep-files option.
pub const STORE_SPATIAL_FILES_FIELD: &str = "store_spatial_files";

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Reduce a client-supplied file name to a single safe path component.
fn sanitize_file_name(name: Option<&str>, role: FileRole) -> String {
    name.map(Path::new)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .unwrap_or_else(|| role.as_str().to_string())
}

async fn save_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to stage upload: {e}")))?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to stage upload: {e}")))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to stage upload: {e}")))?;
    Ok(written)
}

/// Read every multipart field into `staging_dir`.
async fn receive(
    multipart: &mut Multipart,
    staging_dir: &Path,
) -> ApiResult<(UploadFiles, ImportOptions)> {
    let mut files = UploadFiles::new();
    let mut store_spatial_files: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == STORE_SPATIAL_FILES_FIELD {
            store_spatial_files = Some(field.text().await.map_err(multipart_error)?);
            continue;
        }

        let Ok(role) = name.parse::<FileRole>() else {
            tracing::debug!(field = %name, "ignoring unknown upload field");
            continue;
        };
        if files.get(role).is_some() {
            return Err(ApiError::validation(
                role.as_str(),
                "Only one file may be submitted for this field.",
            ));
        }

        let file_name = sanitize_file_name(field.file_name(), role);
        let path = staging_dir.join(&file_name);
        if files.paths().any(|staged| staged == path) {
            return Err(ApiError::validation(
                role.as_str(),
                format!("A file named '{file_name}' was already submitted for another field."),
            ));
        }
        let bytes = save_field(field, &path).await?;
        tracing::debug!(role = %role, file = %file_name, bytes, "staged upload file");
        files.insert(role, path);
    }

    let options = ImportOptions {
        store_spatial_files: match store_spatial_files {
            Some(raw) => parse_bool_option(STORE_SPATIAL_FILES_FIELD, &raw)?,
            None => false,
        },
    };

    if files.base_file().is_none() {
        return Err(ApiError::validation(
            FileRole::BaseFile.as_str(),
            "No file was submitted.",
        ));
    }

    Ok((files, options))
}

async fn discard(staging_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(staging_dir).await {
        tracing::warn!(dir = %staging_dir.display(), error = %e, "failed to remove staged upload");
    }
}

fn rejection_reason(err: &ApiError) -> &'static str {
    match err {
        ApiError::Validation { .. } => "invalid",
        ApiError::PayloadTooLarge(_) => "too_large",
        ApiError::BadRequest(_) => "malformed",
        _ => "error",
    }
}

/// POST /v1/uploads
pub async fn create_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let staging_dir: PathBuf = state
        .config
        .server
        .upload_dir
        .join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create upload directory: {e}")))?;

    let (files, options) = match receive(&mut multipart, &staging_dir).await {
        Ok(received) => received,
        Err(e) => {
            discard(&staging_dir).await;
            record_upload_rejected(rejection_reason(&e));
            return Err(e);
        }
    };

    let Some(handler) = state.registry().resolve(&files) else {
        record_upload_rejected("unsupported_format");
        tracing::info!(files = ?files, "no handler accepts upload, using fallback");
        return state
            .fallback_upload
            .handle(&files, &options, &staging_dir)
            .await;
    };

    let kind = handler.kind();
    let execution_id = match state
        .orchestrator
        .dispatch(handler.as_ref(), files, options, Some(staging_dir.clone()))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            discard(&staging_dir).await;
            return Err(e.into());
        }
    };
    UPLOADS_ACCEPTED.with_label_values(&[kind.key()]).inc();
    tracing::info!(execution_id = %execution_id, handler = %kind, "upload accepted");

    let body = ExecutionAccepted {
        execution_id: execution_id.to_string(),
        status_url: format!("/v1/executions/{execution_id}"),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name_strips_directories() {
        assert_eq!(
            sanitize_file_name(Some("../../etc/passwd"), FileRole::BaseFile),
            "passwd"
        );
        assert_eq!(
            sanitize_file_name(Some("stili.gpkg"), FileRole::BaseFile),
            "stili.gpkg"
        );
        assert_eq!(sanitize_file_name(Some(".."), FileRole::DbfFile), "dbf_file");
        assert_eq!(sanitize_file_name(None, FileRole::SldFile), "sld_file");
    }

    #[test]
    fn test_rejection_reason_labels() {
        assert_eq!(
            rejection_reason(&ApiError::validation("store_spatial_files", "bad")),
            "invalid"
        );
        assert_eq!(
            rejection_reason(&ApiError::PayloadTooLarge("x".into())),
            "too_large"
        );
    }
}
