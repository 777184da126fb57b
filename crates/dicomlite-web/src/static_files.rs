//! 上传文件的只读下载服务
//!
//! 下载路径 `/uploads/{patient_id}/{file_name}` 与文件存储的相对路径方案一致，
//! 根目录直接取自 `BlobStore::root()`，两边不会各自配置。

use std::path::Path;
use tower_http::services::ServeDir;
use tracing::info;

/// 创建上传目录的静态文件服务
pub fn uploads_service(upload_root: &Path) -> ServeDir {
    info!("Serving uploads from {:?}", upload_root);
    ServeDir::new(upload_root).append_index_html_on_directories(false)
}
