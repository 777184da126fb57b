//! 数据库连接管理

use crate::gateway::StudyGateway;
use crate::{MemoryGateway, MySqlGateway, PgGateway};
use dicomlite_core::{DicomLiteError, Result};
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// 数据库方言
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Memory,
}

impl Dialect {
    pub fn requires_url(&self) -> bool {
        !matches!(self, Dialect::Memory)
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::Mysql),
            "memory" => Ok(Dialect::Memory),
            other => Err(format!("unknown database dialect: {}", other)),
        }
    }
}

/// 连接参数
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub dialect: Dialect,
    pub url: String,
    pub max_connections: u32,
    pub bootstrap_schema: bool,
}

/// 按方言建立连接池并返回存储网关
pub async fn connect(options: &ConnectOptions) -> Result<Arc<dyn StudyGateway>> {
    if options.dialect.requires_url() && options.url.is_empty() {
        return Err(DicomLiteError::Config(
            "database url is required for SQL dialects".to_string(),
        ));
    }

    let gateway: Arc<dyn StudyGateway> = match options.dialect {
        Dialect::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(options.max_connections)
                .connect(&options.url)
                .await
                .map_err(|e| DicomLiteError::Persistence(format!("connect postgres: {}", e)))?;
            Arc::new(PgGateway::new(pool))
        }
        Dialect::Mysql => {
            let pool = MySqlPoolOptions::new()
                .max_connections(options.max_connections)
                .connect(&options.url)
                .await
                .map_err(|e| DicomLiteError::Persistence(format!("connect mysql: {}", e)))?;
            Arc::new(MySqlGateway::new(pool))
        }
        Dialect::Memory => Arc::new(MemoryGateway::new()),
    };

    info!(dialect = gateway.name(), "Database gateway ready");

    if options.bootstrap_schema {
        gateway.create_tables().await?;
    }

    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!("memory".parse::<Dialect>().unwrap(), Dialect::Memory);
        assert!("sqlite".parse::<Dialect>().is_err());
    }

    #[tokio::test]
    async fn test_sql_dialect_requires_url() {
        let options = ConnectOptions {
            dialect: Dialect::Postgres,
            url: String::new(),
            max_connections: 1,
            bootstrap_schema: false,
        };
        let err = connect(&options).await.err().unwrap();
        assert!(matches!(err, DicomLiteError::Config(_)));
    }

    #[tokio::test]
    async fn test_memory_dialect_connects() {
        let options = ConnectOptions {
            dialect: Dialect::Memory,
            url: String::new(),
            max_connections: 1,
            bootstrap_schema: true,
        };
        let gateway = connect(&options).await.unwrap();
        assert_eq!(gateway.name(), "memory");
        assert!(gateway.get_patients().await.unwrap().is_empty());
    }
}
