//! PostgreSQL 方言实现

use crate::gateway::{StudyGateway, StudyLock};
use crate::models::*;
use async_trait::async_trait;
use dicomlite_core::{DicomLiteError, NewStudy, Patient, Result, StudyRecord, UserCredentials};
use sqlx::{PgPool, Postgres, Transaction};

/// 检查记录的查询列，age_seconds 由数据库时钟计算
const STUDY_COLUMNS: &str = "id, patient_id, file_name, storage_path, created_at, \
     FLOOR(EXTRACT(EPOCH FROM (NOW() - created_at)))::BIGINT AS age_seconds";

fn db_error(e: sqlx::Error) -> DicomLiteError {
    DicomLiteError::Persistence(e.to_string())
}

/// PostgreSQL 存储网关
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name)",
            "CREATE INDEX IF NOT EXISTS idx_studies_patient_created ON studies(patient_id, created_at DESC)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }

        Ok(())
    }
}

#[async_trait]
impl StudyGateway for PgGateway {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                sex CHAR(1),
                image_path VARCHAR(512),
                image_name VARCHAR(255),
                admitted_on DATE
            )
        "#).execute(&self.pool).await.map_err(db_error)?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS studies (
                id BIGSERIAL PRIMARY KEY,
                patient_id BIGINT NOT NULL REFERENCES patients(id),
                file_name VARCHAR(255) NOT NULL,
                storage_path VARCHAR(512) UNIQUE NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(&self.pool).await.map_err(db_error)?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(64) UNIQUE NOT NULL,
                name VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(32) NOT NULL DEFAULT 'medico'
            )
        "#).execute(&self.pool).await.map_err(db_error)?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    async fn get_patients(&self) -> Result<Vec<Patient>> {
        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT id, name, sex, image_path, image_name, admitted_on FROM patients ORDER BY name"
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    async fn find_patient(&self, patient_id: i64) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>(
            "SELECT id, name, sex, image_path, image_name, admitted_on FROM patients WHERE id = $1"
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(Patient::from))
    }

    async fn get_studies_for_patient(&self, patient_id: i64) -> Result<Vec<StudyRecord>> {
        let sql = format!(
            "SELECT {} FROM studies WHERE patient_id = $1 ORDER BY created_at DESC, id DESC",
            STUDY_COLUMNS
        );
        let results = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(results.into_iter().map(StudyRecord::from).collect())
    }

    async fn insert_study(&self, study: &NewStudy) -> Result<StudyRecord> {
        let sql = format!(
            "INSERT INTO studies (patient_id, file_name, storage_path, created_at) \
             VALUES ($1, $2, $3, NOW()) RETURNING {}",
            STUDY_COLUMNS
        );
        sqlx::query_as::<_, DbStudy>(&sql)
            .bind(study.patient_id)
            .bind(&study.file_name)
            .bind(&study.storage_path)
            .fetch_one(&self.pool)
            .await
            .map(StudyRecord::from)
            .map_err(db_error)
    }

    async fn find_study(&self, study_id: i64) -> Result<Option<StudyRecord>> {
        let sql = format!("SELECT {} FROM studies WHERE id = $1", STUDY_COLUMNS);
        let result = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(study_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.map(StudyRecord::from))
    }

    async fn lock_study(&self, study_id: i64) -> Result<Option<Box<dyn StudyLock>>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!("SELECT {} FROM studies WHERE id = $1 FOR UPDATE", STUDY_COLUMNS);
        let row = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(study_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(Box::new(PgStudyLock {
                tx,
                record: StudyRecord::from(row),
            }))),
            None => {
                tx.rollback().await.map_err(db_error)?;
                Ok(None)
            }
        }
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserCredentials>> {
        let result = sqlx::query_as::<_, DbUser>(
            "SELECT id, username, name, password_hash, role FROM users WHERE username = $1"
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(UserCredentials::from))
    }
}

/// `SELECT ... FOR UPDATE` 事务中持有的行锁
struct PgStudyLock {
    tx: Transaction<'static, Postgres>,
    record: StudyRecord,
}

#[async_trait]
impl StudyLock for PgStudyLock {
    fn record(&self) -> &StudyRecord {
        &self.record
    }

    async fn delete_study_row(self: Box<Self>) -> Result<()> {
        let PgStudyLock { mut tx, record } = *self;

        let deleted = sqlx::query("DELETE FROM studies WHERE id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

        if deleted != 1 {
            tx.rollback().await.map_err(db_error)?;
            return Err(DicomLiteError::Persistence(format!(
                "locked study {} vanished before delete",
                record.id
            )));
        }

        tx.commit().await.map_err(db_error)
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db_error)
    }
}
