//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use dicomlite_core::{DicomLiteError, Result};
use dicomlite_workflow::StudyLifecycleManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{login_handler, AuthService};
use crate::handlers::{api_root, delete_study, get_patients, health, list_studies, upload_study};
use crate::static_files::uploads_service;

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<StudyLifecycleManager>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(lifecycle: Arc<StudyLifecycleManager>) -> Self {
        let auth = Arc::new(AuthService::new(lifecycle.gateway().clone()));
        Self { lifecycle, auth }
    }
}

/// Web层设置
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub max_upload_bytes: usize,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, settings: WebSettings) -> Self {
        let app = create_app(state, &settings);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| DicomLiteError::Config(format!("Failed to bind {}: {}", self.addr, e)))?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DicomLiteError::Internal(format!("Web server failed: {}", e)))?;

        info!("Web server stopped");
        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: AppState, settings: &WebSettings) -> Router {
    let uploads = uploads_service(state.lifecycle.blob_store().root());

    Router::new()
        // 根路径
        .route("/", get(api_root))
        // 健康检查
        .route("/health", get(health))
        // API路由
        .nest("/api", api_routes(settings))
        // 上传文件下载
        .nest_service("/uploads", uploads)
        .with_state(state)
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// API 路由
fn api_routes(settings: &WebSettings) -> Router<AppState> {
    Router::new()
        .route("/login", post(login_handler))
        .route("/patients", get(get_patients))
        .route(
            "/patients/:id/studies",
            get(list_studies).post(upload_study),
        )
        .route("/studies/:id", delete(delete_study))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use chrono::Duration;
    use dicomlite_core::{ManualClock, Patient, Sex, UserCredentials};
    use dicomlite_database::MemoryGateway;
    use dicomlite_storage::LocalBlobStore;
    use dicomlite_workflow::DeleteWindow;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "dicomliteboundary";

    struct TestApp {
        app: Router,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    async fn test_app() -> TestApp {
        test_app_with(WebSettings::default()).await
    }

    async fn test_app_with(settings: WebSettings) -> TestApp {
        let clock = Arc::new(ManualClock::default());
        let gateway = MemoryGateway::with_clock(clock.clone());
        gateway
            .add_patient(Patient {
                id: 7,
                name: "Ana Pérez".to_string(),
                sex: Some(Sex::Female),
                image_path: None,
                image_name: None,
                admitted_on: None,
            })
            .await;
        gateway
            .add_user(UserCredentials {
                id: 1,
                username: "drlopez".to_string(),
                name: "Dra. López".to_string(),
                password_hash: crate::auth::hash_password("123456").unwrap(),
                role: "medico".to_string(),
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let lifecycle = StudyLifecycleManager::new(
            Arc::new(gateway),
            Arc::new(LocalBlobStore::new(dir.path())),
            DeleteWindow::default(),
        )
        .with_clock(clock.clone());

        let app = create_app(AppState::new(Arc::new(lifecycle)), &settings);
        TestApp {
            app,
            clock,
            _dir: dir,
        }
    }

    fn upload_request(patient_id: i64, field: &str, file_name: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/zip\r\n\r\n{content}\r\n--{b}--\r\n",
            b = BOUNDARY,
        );
        Request::builder()
            .method("POST")
            .uri(format!("/api/patients/{}/studies", patient_id))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(app: &Router, patient_id: i64) -> Value {
        let response = app
            .clone()
            .oneshot(upload_request(patient_id, "file", "chest scan.zip", "PK-data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn test_upload_list_delete() {
        let t = test_app().await;

        let created = upload(&t.app, 7).await;
        assert_eq!(created["canDelete"], true);
        let path = created["path"].as_str().unwrap().to_string();
        assert!(path.starts_with("7/"));
        assert!(path.ends_with("_chest_scan.zip"));
        let id = created["id"].as_i64().unwrap();

        let response = t
            .app
            .clone()
            .oneshot(empty_request("GET", "/api/patients/7/studies"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], id);
        assert_eq!(listed[0]["canDelete"], true);
        assert!(listed[0].get("minutesSinceCreation").is_some());
        assert!(listed[0].get("creationTimestamp").is_some());

        let response = t
            .app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/studies/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], true);

        let response = t
            .app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/studies/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_after_window_is_forbidden() {
        let t = test_app().await;
        let created = upload(&t.app, 7).await;
        let id = created["id"].as_i64().unwrap();

        t.clock.advance(Duration::minutes(6));
        let response = t
            .app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/studies/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = t
            .app
            .clone()
            .oneshot(empty_request("GET", "/api/patients/7/studies"))
            .await
            .unwrap();
        let listed = json_body(response).await;
        assert_eq!(listed[0]["canDelete"], false);
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let t = test_app().await;

        let response = t
            .app
            .clone()
            .oneshot(upload_request(7, "attachment", "a.zip", "x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = t
            .app
            .clone()
            .oneshot(upload_request(404, "file", "a.zip", "x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_listing_is_ok() {
        let t = test_app().await;
        let response = t
            .app
            .clone()
            .oneshot(empty_request("GET", "/api/patients/99/studies"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_uploaded_file_is_downloadable() {
        let t = test_app().await;
        let created = upload(&t.app, 7).await;
        let path = created["path"].as_str().unwrap();

        let response = t
            .app
            .clone()
            .oneshot(empty_request("GET", &format!("/uploads/{}", path)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"PK-data");
    }

    #[tokio::test]
    async fn test_patients_and_login() {
        let t = test_app().await;

        let response = t
            .app
            .clone()
            .oneshot(empty_request("GET", "/api/patients"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let patients = json_body(response).await;
        assert_eq!(patients[0]["name"], "Ana Pérez");

        let login = |password: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": "drlopez", "password": password }).to_string(),
                ))
                .unwrap()
        };

        let response = t.app.clone().oneshot(login("123456")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["username"], "drlopez");

        let response = t.app.clone().oneshot(login("wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let t = test_app_with(WebSettings {
            max_upload_bytes: 8 * 1024,
        })
        .await;

        let content = "x".repeat(64 * 1024);
        let response = t
            .app
            .clone()
            .oneshot(upload_request(7, "file", "big.zip", &content))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json_body(response).await.get("error").is_some());

        let response = t
            .app
            .clone()
            .oneshot(empty_request("GET", "/api/patients/7/studies"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_malformed_login_body() {
        let t = test_app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("username=drlopez"))
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }
}
