//! # DICOM-lite 数据库模块
//!
//! 患者与检查记录的存储网关。`StudyGateway` 定义统一接口，
//! PostgreSQL 与 MySQL 各有一份方言实现，另有供开发和测试使用的内存实现。

pub mod connection;
pub mod gateway;
pub mod memory;
pub mod models;
pub mod mysql;
pub mod postgres;

// 重新导出主要类型
pub use connection::{connect, ConnectOptions, Dialect};
pub use gateway::{StudyGateway, StudyLock};
pub use memory::MemoryGateway;
pub use mysql::MySqlGateway;
pub use postgres::PgGateway;
