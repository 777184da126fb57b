//! HTTP处理器

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use dicomlite_core::{DicomLiteError, ErrorKind, Patient};
use dicomlite_workflow::{DeleteOutcome, StudyView};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::io::StreamReader;
use tracing::{error, info, warn};

use crate::server::AppState;

/// 接口层错误，包装核心错误并映射为状态码
#[derive(Debug)]
pub struct ApiError(pub DicomLiteError);

impl From<DicomLiteError> for ApiError {
    fn from(err: DicomLiteError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, message) = match err.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, err.to_string()),
            ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
            ErrorKind::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()),
            ErrorKind::StorageIo | ErrorKind::Persistence | ErrorKind::Internal => {
                error!("Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ErrorKind::Inconsistency => {
                error!(critical = true, "Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// 上传成功的响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedStudy {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub can_delete: bool,
}

impl From<StudyView> for CreatedStudy {
    fn from(view: StudyView) -> Self {
        Self {
            id: view.id,
            name: view.name,
            path: view.path,
            can_delete: view.can_delete,
        }
    }
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "DICOM-lite API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api",
            "uploads": "/uploads"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 患者列表
pub async fn get_patients(State(state): State<AppState>) -> Result<Json<Vec<Patient>>, ApiError> {
    let patients = state.lifecycle.gateway().get_patients().await?;
    Ok(Json(patients))
}

/// 患者的检查列表，最新的在前
pub async fn list_studies(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Vec<StudyView>>, ApiError> {
    let listing = state.lifecycle.list_studies(patient_id).await?;
    Ok(Json(listing.iter().collect()))
}

/// 上传检查文件（multipart 字段名 `file`）
pub async fn upload_study(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedStudy>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let too_large = AtomicBool::new(false);
        let body = field.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large.store(true, Ordering::Relaxed);
            }
            std::io::Error::new(std::io::ErrorKind::Other, e)
        });
        let reader = StreamReader::new(Box::pin(body));

        let created = state
            .lifecycle
            .create_study(patient_id, &original_name, reader)
            .await;
        let study = match created {
            Err(_) if too_large.load(Ordering::Relaxed) => {
                return Err(payload_too_large().into());
            }
            other => other?,
        };
        info!(study_id = study.id, patient_id, "Upload stored");
        return Ok((StatusCode::CREATED, Json(CreatedStudy::from(study))));
    }

    Err(DicomLiteError::Validation("No file uploaded".to_string()).into())
}

fn payload_too_large() -> DicomLiteError {
    DicomLiteError::PayloadTooLarge("upload exceeds the configured size limit".to_string())
}

/// 区分超出大小限制与格式错误的 multipart 请求
fn multipart_error(err: MultipartError) -> DicomLiteError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload rejected: {}", err);
        payload_too_large()
    } else {
        DicomLiteError::Validation(format!("Invalid multipart request: {}", err.body_text()))
    }
}

/// 删除检查
pub async fn delete_study(
    State(state): State<AppState>,
    Path(study_id): Path<i64>,
) -> Result<Response, ApiError> {
    match state.lifecycle.delete_study(study_id).await? {
        DeleteOutcome::Deleted => Ok(Json(json!({ "success": true })).into_response()),
        DeleteOutcome::WindowExpired {
            minutes_since_creation,
        } => {
            warn!(study_id, minutes_since_creation, "Delete rejected after window");
            Ok((
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Delete window expired",
                    "minutesSinceCreation": minutes_since_creation
                })),
            )
                .into_response())
        }
    }
}
