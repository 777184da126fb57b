//! 上传文件存储管理

use async_trait::async_trait;
use dicomlite_core::{DicomLiteError, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

/// 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// 写入成功，附带字节数
    Written { bytes: u64 },
    /// 目标文件已存在，未做任何修改
    AlreadyExists,
}

/// 文件存储接口
///
/// 路径均为相对上传根目录的 `{patient_id}/{file_name}` 形式，
/// 与静态下载路由共用同一根目录。
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 上传根目录
    fn root(&self) -> &Path;

    /// 创建新文件并写入全部内容，不覆盖已有文件
    ///
    /// 写入中途失败时，已写入的部分文件会被删除。
    async fn put_new(
        &self,
        relative: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<PutOutcome>;

    /// 删除文件，文件不存在时返回 `NotFound`
    async fn remove(&self, relative: &str) -> Result<()>;
}

/// 本地文件系统存储
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 创建根目录（启动时调用）
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DicomLiteError::StorageIo(format!("create upload root: {}", e)))
    }

    /// 把相对路径解析到根目录之下，拒绝 `..` 与绝对路径
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        let mut depth = 0;
        for component in rel.components() {
            match component {
                Component::Normal(_) => depth += 1,
                _ => {
                    return Err(DicomLiteError::Validation(format!(
                        "blob path escapes upload root: {}",
                        relative
                    )))
                }
            }
        }
        if depth == 0 {
            return Err(DicomLiteError::Validation("empty blob path".to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn put_new(
        &self,
        relative: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<PutOutcome> {
        let full_path = self.resolve(relative)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DicomLiteError::StorageIo(format!("create {:?}: {}", parent, e)))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Ok(PutOutcome::AlreadyExists);
            }
            Err(e) => {
                return Err(DicomLiteError::StorageIo(format!(
                    "open {:?}: {}",
                    full_path, e
                )))
            }
        };

        let written = async {
            let bytes = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        match written {
            Ok(bytes) => {
                debug!(path = %relative, bytes, "Stored blob");
                Ok(PutOutcome::Written { bytes })
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&full_path).await {
                    warn!(path = %relative, error = %cleanup, "Failed to remove partial blob");
                }
                Err(DicomLiteError::StorageIo(format!(
                    "write {}: {}",
                    relative, e
                )))
            }
        }
    }

    async fn remove(&self, relative: &str) -> Result<()> {
        let full_path = self.resolve(relative)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!(path = %relative, "Removed blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DicomLiteError::NotFound(format!(
                "blob {}",
                relative
            ))),
            Err(e) => Err(DicomLiteError::StorageIo(format!(
                "remove {}: {}",
                relative, e
            ))),
        }
    }
}
