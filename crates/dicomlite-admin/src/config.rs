//! 配置管理
//!
//! 配置按以下顺序叠加：内置默认值 → 可选配置文件 → `DICOMLITE__` 前缀环境变量。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use dicomlite_database::{ConnectOptions, Dialect};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

/// 系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 上传文件存储配置
    pub storage: StorageConfig,
    /// 删除窗口策略
    pub policy: PolicyConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 单次上传的最大字节数
    pub max_upload_bytes: usize,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub dialect: Dialect,
    /// 连接字符串
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 启动时执行 `CREATE TABLE IF NOT EXISTS`
    pub bootstrap_schema: bool,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 上传根目录，同时作为 `/uploads` 静态下载的根
    pub upload_root: PathBuf,
}

/// 删除窗口策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub delete_window_minutes: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 指令
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
}

impl AppConfig {
    /// 加载配置，`config_path` 为空时只用默认值和环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("DICOMLITE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        ConfigValidator::new().validate(self)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            dialect: self.database.dialect,
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            bootstrap_schema: self.database.bootstrap_schema,
        }
    }
}

/// 配置验证规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&AppConfig) -> Result<()>,
}

/// 配置验证器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "server.max_upload_bytes",
                validator: |config| {
                    if config.server.max_upload_bytes == 0 {
                        Err(anyhow::anyhow!("Upload limit cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "database.url",
                validator: |config| {
                    if config.database.dialect.requires_url() && config.database.url.trim().is_empty() {
                        Err(anyhow::anyhow!("Database url is required for {:?}", config.database.dialect))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "database.max_connections",
                validator: |config| {
                    if config.database.max_connections == 0 {
                        Err(anyhow::anyhow!("Database max connections cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "storage.upload_root",
                validator: |config| {
                    if config.storage.upload_root.as_os_str().is_empty() {
                        Err(anyhow::anyhow!("Upload root cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "policy.delete_window_minutes",
                validator: |config| {
                    if config.policy.delete_window_minutes == 0 {
                        Err(anyhow::anyhow!("Delete window must be at least one minute"))
                    } else {
                        Ok(())
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("invalid {}", rule.field_path)));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            url: "postgres://postgres@localhost:5432/dicomlite".to_string(),
            max_connections: 5,
            bootstrap_schema: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("./uploads"),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            delete_window_minutes: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
