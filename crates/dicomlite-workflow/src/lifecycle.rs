//! 检查生命周期管理
//!
//! 上传时先写文件再插入记录；删除时先在行锁内删除文件，再删除记录。
//! 任一步失败都会让文件与记录回到"都在"或"都不在"之一，
//! 无法回到一致状态时按严重故障记录并返回 `Inconsistency`。

use crate::state_machine::{StudyEvent, StudyPhase, StudyStateMachine};
use crate::window::{DeleteWindow, StudyView};
use dicomlite_core::utils::{
    disambiguated_file_name, sanitize_file_name, study_storage_path, timestamped_file_name,
};
use dicomlite_core::{Clock, DicomLiteError, NewStudy, Result, StudyRecord, SystemClock};
use dicomlite_database::{StudyGateway, StudyLock};
use dicomlite_storage::{BlobStore, PutOutcome};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};

/// 删除请求的结果
///
/// 窗口过期是策略拒绝，不是故障，因此不走 `Err`。
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    WindowExpired { minutes_since_creation: f64 },
}

/// 某一时刻的检查列表快照
///
/// 派生字段在迭代时按快照中的经过时间计算，可多次迭代，结果相同。
#[derive(Debug, Clone)]
pub struct StudyListing {
    records: Vec<StudyRecord>,
    window: DeleteWindow,
}

impl StudyListing {
    pub fn iter(&self) -> impl Iterator<Item = StudyView> + '_ {
        self.records.iter().map(move |r| self.window.view(r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a StudyListing {
    type Item = StudyView;
    type IntoIter = Box<dyn Iterator<Item = StudyView> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// 检查生命周期管理器
pub struct StudyLifecycleManager {
    gateway: Arc<dyn StudyGateway>,
    blobs: Arc<dyn BlobStore>,
    window: DeleteWindow,
    state_machine: StudyStateMachine,
    clock: Arc<dyn Clock>,
}

impl StudyLifecycleManager {
    pub fn new(gateway: Arc<dyn StudyGateway>, blobs: Arc<dyn BlobStore>, window: DeleteWindow) -> Self {
        Self {
            gateway,
            blobs,
            window,
            state_machine: StudyStateMachine::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// 替换用于生成文件名前缀的时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn window(&self) -> DeleteWindow {
        self.window
    }

    pub fn gateway(&self) -> &Arc<dyn StudyGateway> {
        &self.gateway
    }

    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// 上传新检查
    pub async fn create_study<R>(
        &self,
        patient_id: i64,
        original_name: &str,
        mut content: R,
    ) -> Result<StudyView>
    where
        R: AsyncRead + Unpin + Send,
    {
        if original_name.trim().is_empty() {
            return Err(DicomLiteError::Validation("file name is required".to_string()));
        }
        if self.gateway.find_patient(patient_id).await?.is_none() {
            return Err(DicomLiteError::NotFound(format!("patient {}", patient_id)));
        }

        let safe_name = sanitize_file_name(original_name);
        let at = self.clock.now();

        let mut file_name = timestamped_file_name(&safe_name, at);
        let mut storage_path = study_storage_path(patient_id, &file_name);
        let mut outcome = self.blobs.put_new(&storage_path, &mut content).await?;
        if outcome == PutOutcome::AlreadyExists {
            debug!(patient_id, path = %storage_path, "Blob name taken, disambiguating");
            file_name = disambiguated_file_name(&safe_name, at);
            storage_path = study_storage_path(patient_id, &file_name);
            outcome = self.blobs.put_new(&storage_path, &mut content).await?;
        }
        if outcome == PutOutcome::AlreadyExists {
            return Err(DicomLiteError::StorageIo(format!(
                "could not allocate a unique blob name for {}",
                safe_name
            )));
        }

        let new_study = NewStudy {
            patient_id,
            file_name,
            storage_path,
        };

        let record = match self.gateway.insert_study(&new_study).await {
            Ok(record) => record,
            Err(e) => {
                warn!(patient_id, path = %new_study.storage_path, error = %e, "Study insert failed, removing blob");
                if let Err(cleanup) = self.blobs.remove(&new_study.storage_path).await {
                    error!(
                        critical = true,
                        patient_id,
                        path = %new_study.storage_path,
                        error = %cleanup,
                        "Orphaned blob could not be removed"
                    );
                    return Err(DicomLiteError::Inconsistency(format!(
                        "orphaned blob {} after failed insert",
                        new_study.storage_path
                    )));
                }
                return Err(match e {
                    e @ DicomLiteError::Persistence(_) => e,
                    other => DicomLiteError::Persistence(other.to_string()),
                });
            }
        };

        let phase = self
            .state_machine
            .transition(&StudyPhase::Created, &StudyEvent::Persisted)?;
        info!(
            study_id = record.id,
            patient_id,
            path = %record.storage_path,
            phase = ?phase,
            "Study created"
        );
        Ok(self.window.view(&record))
    }

    /// 列出患者的检查，最新的在前
    pub async fn list_studies(&self, patient_id: i64) -> Result<StudyListing> {
        let records = self.gateway.get_studies_for_patient(patient_id).await?;
        debug!(patient_id, count = records.len(), "Listed studies");
        Ok(StudyListing {
            records,
            window: self.window,
        })
    }

    /// 删除检查
    ///
    /// 整个过程持有行锁，同一检查的并发删除只有一个成功，其余得到 `NotFound`。
    /// 记录存在但文件缺失、或文件已删而记录删除失败时，返回 `ErrorKind::Inconsistency`。
    pub async fn delete_study(&self, study_id: i64) -> Result<DeleteOutcome> {
        let lock = self
            .gateway
            .lock_study(study_id)
            .await?
            .ok_or_else(|| DicomLiteError::NotFound(format!("study {}", study_id)))?;

        let record = lock.record().clone();
        let phase = self.window.phase(&record, &self.state_machine);

        let Ok(next_phase) = self.state_machine.transition(&phase, &StudyEvent::Delete) else {
            release(lock).await;
            info!(
                study_id,
                minutes = record.minutes_since_creation(),
                "Delete refused, window expired"
            );
            return Ok(DeleteOutcome::WindowExpired {
                minutes_since_creation: record.minutes_since_creation(),
            });
        };

        match self.blobs.remove(&record.storage_path).await {
            Ok(()) => {}
            Err(DicomLiteError::NotFound(_)) => {
                release(lock).await;
                error!(
                    critical = true,
                    study_id,
                    path = %record.storage_path,
                    "Blob missing for existing study row"
                );
                return Err(DicomLiteError::Inconsistency(format!(
                    "blob {} missing for study {}",
                    record.storage_path, study_id
                )));
            }
            Err(e) => {
                release(lock).await;
                error!(study_id, path = %record.storage_path, error = %e, "Blob removal failed");
                return Err(e);
            }
        }

        if let Err(e) = lock.delete_study_row().await {
            error!(
                critical = true,
                study_id,
                path = %record.storage_path,
                error = %e,
                "Blob removed but study row delete failed, manual reconciliation required"
            );
            return Err(DicomLiteError::Inconsistency(format!(
                "study {} row survived blob removal: {}",
                study_id, e
            )));
        }

        info!(study_id, path = %record.storage_path, phase = ?next_phase, "Study deleted");
        Ok(DeleteOutcome::Deleted)
    }
}

async fn release(lock: Box<dyn StudyLock>) {
    let study_id = lock.record().id;
    if let Err(e) = lock.release().await {
        warn!(study_id, error = %e, "Failed to release study lock");
    }
}
