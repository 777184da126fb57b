//! # DICOM-lite Web模块
//!
//! HTTP 接口层：把请求映射到检查生命周期管理器，并把结果与错误类别映射为状态码。

pub mod auth;
pub mod handlers;
pub mod server;
pub mod static_files;

pub use auth::{hash_password, AuthService};
pub use handlers::ApiError;
pub use server::{create_app, AppState, WebServer, WebSettings};
