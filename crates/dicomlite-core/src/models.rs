//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 患者基本信息（本系统只读）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub sex: Option<Sex>,
    pub image_path: Option<String>, // 头像相对路径
    pub image_name: Option<String>,
    pub admitted_on: Option<NaiveDate>, // 入院日期
}

/// 性别枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    /// 数据库中的单字符编码
    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "M" | "m" => Some(Sex::Male),
            "F" | "f" => Some(Sex::Female),
            "O" | "o" => Some(Sex::Other),
            _ => None,
        }
    }
}

/// 检查记录
///
/// `age_seconds` 由存储网关的时钟在读取时计算，从不持久化，
/// 也从不接受客户端提供的时间。
#[derive(Debug, Clone, PartialEq)]
pub struct StudyRecord {
    pub id: i64,
    pub patient_id: i64,
    pub file_name: String,
    pub storage_path: String, // `{patient_id}/{file_name}`，相对上传根目录
    pub created_at: DateTime<Utc>,
    pub age_seconds: i64,
}

impl StudyRecord {
    pub fn minutes_since_creation(&self) -> f64 {
        self.age_seconds.max(0) as f64 / 60.0
    }
}

/// 新检查插入模型，创建时间由存储层赋值
#[derive(Debug, Clone)]
pub struct NewStudy {
    pub patient_id: i64,
    pub file_name: String,
    pub storage_path: String,
}

/// 登录凭据（含密码哈希，不对外序列化）
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
}
