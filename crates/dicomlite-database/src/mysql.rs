//! MySQL 方言实现

use crate::gateway::{StudyGateway, StudyLock};
use crate::models::*;
use async_trait::async_trait;
use dicomlite_core::{DicomLiteError, NewStudy, Patient, Result, StudyRecord, UserCredentials};
use sqlx::{MySql, MySqlPool, Transaction};

const STUDY_COLUMNS: &str = "id, patient_id, file_name, storage_path, created_at, \
     TIMESTAMPDIFF(SECOND, created_at, NOW(3)) AS age_seconds";

fn db_error(e: sqlx::Error) -> DicomLiteError {
    DicomLiteError::Persistence(e.to_string())
}

/// MySQL 存储网关
#[derive(Clone)]
pub struct MySqlGateway {
    pool: MySqlPool,
}

impl MySqlGateway {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudyGateway for MySqlGateway {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                sex CHAR(1),
                image_path VARCHAR(512),
                image_name VARCHAR(255),
                admitted_on DATE,
                INDEX idx_patients_name (name)
            )
        "#).execute(&self.pool).await.map_err(db_error)?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS studies (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                patient_id BIGINT NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                storage_path VARCHAR(512) NOT NULL,
                created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
                UNIQUE KEY uq_studies_storage_path (storage_path),
                INDEX idx_studies_patient_created (patient_id, created_at),
                CONSTRAINT fk_studies_patient FOREIGN KEY (patient_id) REFERENCES patients(id)
            )
        "#).execute(&self.pool).await.map_err(db_error)?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                username VARCHAR(64) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(32) NOT NULL DEFAULT 'medico'
            )
        "#).execute(&self.pool).await.map_err(db_error)?;

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
            "SELECT id, name, sex, image_path, image_name, admitted_on FROM patients WHERE id = ?"
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(Patient::from))
    }

    async fn get_studies_for_patient(&self, patient_id: i64) -> Result<Vec<StudyRecord>> {
        let sql = format!(
            "SELECT {} FROM studies WHERE patient_id = ? ORDER BY created_at DESC, id DESC",
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
        // MySQL 没有 RETURNING，在同一事务内插入后回读
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query(
            "INSERT INTO studies (patient_id, file_name, storage_path, created_at) VALUES (?, ?, ?, NOW(3))"
        )
        .bind(study.patient_id)
        .bind(&study.file_name)
        .bind(&study.storage_path)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let sql = format!("SELECT {} FROM studies WHERE id = ?", STUDY_COLUMNS);
        let row = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(inserted.last_insert_id() as i64)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(StudyRecord::from(row))
    }

    async fn find_study(&self, study_id: i64) -> Result<Option<StudyRecord>> {
        let sql = format!("SELECT {} FROM studies WHERE id = ?", STUDY_COLUMNS);
        let result = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(study_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.map(StudyRecord::from))
    }

    async fn lock_study(&self, study_id: i64) -> Result<Option<Box<dyn StudyLock>>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // InnoDB 的加锁读总是读取最新提交版本，先删者提交后这里得到空结果
        let sql = format!("SELECT {} FROM studies WHERE id = ? FOR UPDATE", STUDY_COLUMNS);
        let row = sqlx::query_as::<_, DbStudy>(&sql)
            .bind(study_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(Box::new(MySqlStudyLock {
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
            "SELECT id, username, name, password_hash, role FROM users WHERE username = ?"
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(UserCredentials::from))
    }
}

struct MySqlStudyLock {
    tx: Transaction<'static, MySql>,
    record: StudyRecord,
}

#[async_trait]
impl StudyLock for MySqlStudyLock {
    fn record(&self) -> &StudyRecord {
        &self.record
    }

    async fn delete_study_row(self: Box<Self>) -> Result<()> {
        let MySqlStudyLock { mut tx, record } = *self;

        let deleted = sqlx::query("DELETE FROM studies WHERE id = ?")
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
