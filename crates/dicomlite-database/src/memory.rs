//! 内存存储网关
//!
//! 语义与 SQL 实现一致：创建时间和 age_seconds 取注入的时钟，
//! `lock_study` 持有整表互斥锁直到提交或释放。

use crate::gateway::{StudyGateway, StudyLock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dicomlite_core::{
    Clock, DicomLiteError, NewStudy, Patient, Result, StudyRecord, SystemClock, UserCredentials,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
struct StoredStudy {
    id: i64,
    patient_id: i64,
    file_name: String,
    storage_path: String,
    created_at: DateTime<Utc>,
}

impl StoredStudy {
    fn to_record(&self, now: DateTime<Utc>) -> StudyRecord {
        StudyRecord {
            id: self.id,
            patient_id: self.patient_id,
            file_name: self.file_name.clone(),
            storage_path: self.storage_path.clone(),
            created_at: self.created_at,
            age_seconds: (now - self.created_at).num_seconds().max(0),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    patients: BTreeMap<i64, Patient>,
    studies: BTreeMap<i64, StoredStudy>,
    users: HashMap<String, UserCredentials>,
    next_study_id: i64,
}

/// 内存存储网关
#[derive(Clone)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                next_study_id: 1,
                ..Default::default()
            })),
            clock,
        }
    }

    pub async fn add_patient(&self, patient: Patient) {
        self.state.lock().await.patients.insert(patient.id, patient);
    }

    pub async fn add_user(&self, user: UserCredentials) {
        self.state
            .lock()
            .await
            .users
            .insert(user.username.clone(), user);
    }

    /// 当前检查行数
    pub async fn study_count(&self) -> usize {
        self.state.lock().await.studies.len()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StudyGateway for MemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_tables(&self) -> Result<()> {
        Ok(())
    }

    async fn get_patients(&self) -> Result<Vec<Patient>> {
        let state = self.state.lock().await;
        let mut patients: Vec<Patient> = state.patients.values().cloned().collect();
        patients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(patients)
    }

    async fn find_patient(&self, patient_id: i64) -> Result<Option<Patient>> {
        Ok(self.state.lock().await.patients.get(&patient_id).cloned())
    }

    async fn get_studies_for_patient(&self, patient_id: i64) -> Result<Vec<StudyRecord>> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        let mut studies: Vec<StudyRecord> = state
            .studies
            .values()
            .filter(|s| s.patient_id == patient_id)
            .map(|s| s.to_record(now))
            .collect();
        studies.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(studies)
    }

    async fn insert_study(&self, study: &NewStudy) -> Result<StudyRecord> {
        let mut state = self.state.lock().await;

        if !state.patients.contains_key(&study.patient_id) {
            return Err(DicomLiteError::Persistence(format!(
                "foreign key violation: patient {} does not exist",
                study.patient_id
            )));
        }
        if state
            .studies
            .values()
            .any(|s| s.storage_path == study.storage_path)
        {
            return Err(DicomLiteError::Persistence(format!(
                "unique violation: storage path {}",
                study.storage_path
            )));
        }

        let now = self.clock.now();
        let id = state.next_study_id;
        state.next_study_id += 1;

        let stored = StoredStudy {
            id,
            patient_id: study.patient_id,
            file_name: study.file_name.clone(),
            storage_path: study.storage_path.clone(),
            created_at: now,
        };
        let record = stored.to_record(now);
        state.studies.insert(id, stored);
        Ok(record)
    }

    async fn find_study(&self, study_id: i64) -> Result<Option<StudyRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .studies
            .get(&study_id)
            .map(|s| s.to_record(self.clock.now())))
    }

    async fn lock_study(&self, study_id: i64) -> Result<Option<Box<dyn StudyLock>>> {
        let guard = self.state.clone().lock_owned().await;
        let record = match guard.studies.get(&study_id) {
            Some(stored) => stored.to_record(self.clock.now()),
            None => return Ok(None),
        };
        Ok(Some(Box::new(MemoryStudyLock { guard, record })))
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserCredentials>> {
        Ok(self.state.lock().await.users.get(username).cloned())
    }
}

struct MemoryStudyLock {
    guard: OwnedMutexGuard<MemoryState>,
    record: StudyRecord,
}

#[async_trait]
impl StudyLock for MemoryStudyLock {
    fn record(&self) -> &StudyRecord {
        &self.record
    }

    async fn delete_study_row(self: Box<Self>) -> Result<()> {
        let MemoryStudyLock { mut guard, record } = *self;
        match guard.studies.remove(&record.id) {
            Some(_) => Ok(()),
            None => Err(DicomLiteError::Persistence(format!(
                "locked study {} vanished before delete",
                record.id
            ))),
        }
    }

    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
