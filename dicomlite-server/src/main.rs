//! DICOM-lite 服务器主程序

use anyhow::{Context, Result};
use clap::Parser;
use dicomlite_admin::{init_logging, AppConfig};
use dicomlite_database::{connect, Dialect};
use dicomlite_storage::LocalBlobStore;
use dicomlite_web::{AppState, WebServer, WebSettings};
use dicomlite_workflow::{DeleteWindow, StudyLifecycleManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// 命令行参数，覆盖配置文件和环境变量中的同名项
#[derive(Parser, Debug)]
#[command(name = "dicomlite-server")]
#[command(about = "DICOM-lite 检查上传与管理服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 上传根目录
    #[arg(short, long)]
    upload_root: Option<PathBuf>,

    /// 数据库连接字符串
    #[arg(long)]
    database_url: Option<String>,

    /// 数据库方言 (postgres / mysql / memory)
    #[arg(long)]
    dialect: Option<Dialect>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = self.upload_root {
            config.storage.upload_root = root;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(dialect) = self.dialect {
            config.database.dialect = dialect;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging)?;

    info!("Starting DICOM-lite server...");
    info!("  Listen: {}:{}", config.server.host, config.server.port);
    info!("  Upload root: {:?}", config.storage.upload_root);
    info!("  Delete window: {} min", config.policy.delete_window_minutes);

    let gateway = connect(&config.connect_options())
        .await
        .context("Failed to connect to database")?;

    let blobs = LocalBlobStore::new(&config.storage.upload_root);
    blobs
        .ensure_root()
        .await
        .context("Failed to prepare upload root")?;

    let window = DeleteWindow::from_minutes(config.policy.delete_window_minutes)?;
    let lifecycle = StudyLifecycleManager::new(gateway, Arc::new(blobs), window);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let settings = WebSettings {
        max_upload_bytes: config.server.max_upload_bytes,
    };

    let server = WebServer::new(addr, AppState::new(Arc::new(lifecycle)), settings);
    if let Err(e) = server.run().await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
