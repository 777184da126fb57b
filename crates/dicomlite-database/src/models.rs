//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use dicomlite_core::models::*;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: i64,
    pub name: String,
    pub sex: Option<String>, // 存储为单字符，转换为Sex枚举
    pub image_path: Option<String>,
    pub image_name: Option<String>,
    pub admitted_on: Option<NaiveDate>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            name: db_patient.name,
            sex: db_patient.sex.as_deref().and_then(Sex::from_code),
            image_path: db_patient.image_path,
            image_name: db_patient.image_name,
            admitted_on: db_patient.admitted_on,
        }
    }
}

/// 数据库检查表（附带查询时计算的 age_seconds 列）
#[derive(Debug, FromRow)]
pub struct DbStudy {
    pub id: i64,
    pub patient_id: i64,
    pub file_name: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub age_seconds: i64,
}

impl From<DbStudy> for StudyRecord {
    fn from(db_study: DbStudy) -> Self {
        StudyRecord {
            id: db_study.id,
            patient_id: db_study.patient_id,
            file_name: db_study.file_name,
            storage_path: db_study.storage_path,
            created_at: db_study.created_at,
            // 数据库与写入端时钟有微小偏差时可能为负
            age_seconds: db_study.age_seconds.max(0),
        }
    }
}

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
}

impl From<DbUser> for UserCredentials {
    fn from(db_user: DbUser) -> Self {
        UserCredentials {
            id: db_user.id,
            username: db_user.username,
            name: db_user.name,
            password_hash: db_user.password_hash,
            role: db_user.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_conversion() {
        let patient = Patient::from(DbPatient {
            id: 7,
            name: "Ana Pérez".to_string(),
            sex: Some("F".to_string()),
            image_path: Some("img/7.png".to_string()),
            image_name: Some("7.png".to_string()),
            admitted_on: NaiveDate::from_ymd_opt(2024, 3, 1),
        });
        assert_eq!(patient.id, 7);
        assert_eq!(patient.sex, Some(Sex::Female));

        let unknown = Patient::from(DbPatient {
            id: 8,
            name: "X".to_string(),
            sex: Some("?".to_string()),
            image_path: None,
            image_name: None,
            admitted_on: None,
        });
        assert_eq!(unknown.sex, None);
    }

    #[test]
    fn test_study_conversion_clamps_negative_age() {
        let record = StudyRecord::from(DbStudy {
            id: 1,
            patient_id: 7,
            file_name: "1_chest.zip".to_string(),
            storage_path: "7/1_chest.zip".to_string(),
            created_at: Utc::now(),
            age_seconds: -2,
        });
        assert_eq!(record.age_seconds, 0);
        assert_eq!(record.minutes_since_creation(), 0.0);
    }
}
