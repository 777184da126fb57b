//! 用户登录
//!
//! 只接受 Argon2 PHC 格式的密码哈希。明文或旧式 bcrypt 记录一律拒绝并记录告警，
//! 需要运维重新设置密码。

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dicomlite_core::{DicomLiteError, ErrorKind, Result};
use dicomlite_database::StudyGateway;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::server::AppState;

/// 登录请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 用户信息（不包含敏感数据）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: String,
}

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    gateway: Arc<dyn StudyGateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<dyn StudyGateway>) -> Self {
        Self { gateway }
    }

    /// 用户登录
    pub async fn login(&self, request: LoginRequest) -> Result<UserInfo> {
        if request.username.trim().is_empty() || request.password.is_empty() {
            return Err(DicomLiteError::Validation("Missing credentials".to_string()));
        }

        let user = self
            .gateway
            .find_user(request.username.trim())
            .await?
            .ok_or_else(|| DicomLiteError::Unauthorized("Invalid username or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash) {
            return Err(DicomLiteError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }

        Ok(UserInfo {
            id: user.id,
            username: user.username,
            name: user.name,
            role: user.role,
        })
    }
}

/// 生成 Argon2 密码哈希
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DicomLiteError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let parsed = match PasswordHash::new(stored) {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Stored credential is not an Argon2 hash, refusing login");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Malformed login request: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "Invalid login request" })),
            )
                .into_response();
        }
    };
    let username = request.username.clone();
    info!("Login attempt for user: {}", username);

    match state.auth.login(request).await {
        Ok(user) => {
            info!("User logged in successfully: {}", user.username);
            Json(json!({ "success": true, "user": user })).into_response()
        }
        Err(e) => {
            let (status, message) = match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, e.to_string()),
                ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, e.to_string()),
                _ => {
                    error!("Login failed for {}: {}", username, e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
                }
            };
            warn!("Login failed for {}: {}", username, message);
            (status, Json(json!({ "success": false, "message": message }))).into_response()
        }
    }
}
