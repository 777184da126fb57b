//! 删除窗口策略

use crate::state_machine::{StudyEvent, StudyPhase, StudyStateMachine};
use chrono::{DateTime, Utc};
use dicomlite_core::{DicomLiteError, Result, StudyRecord};
use serde::Serialize;

/// 删除窗口
///
/// 检查创建后 `limit` 时间内（含边界）允许删除。窗口长度来自配置，
/// 经过时间只取存储网关给出的 `age_seconds`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteWindow {
    limit_seconds: i64,
}

impl DeleteWindow {
    pub const DEFAULT_MINUTES: u32 = 5;

    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if minutes == 0 {
            return Err(DicomLiteError::Config(
                "delete window must be at least one minute".to_string(),
            ));
        }
        Ok(Self {
            limit_seconds: i64::from(minutes) * 60,
        })
    }

    pub fn limit_seconds(&self) -> i64 {
        self.limit_seconds
    }

    pub fn allows(&self, age_seconds: i64) -> bool {
        age_seconds <= self.limit_seconds
    }

    /// 由读取时的经过时间推断已持久化检查的状态
    pub fn phase(&self, record: &StudyRecord, machine: &StudyStateMachine) -> StudyPhase {
        let mut phase = StudyPhase::Listable;
        if !self.allows(record.age_seconds) {
            phase = machine
                .transition(&phase, &StudyEvent::WindowElapsed)
                .unwrap_or(StudyPhase::Expired);
        }
        phase
    }

    /// 生成某一时刻的快照视图
    pub fn view(&self, record: &StudyRecord) -> StudyView {
        StudyView {
            id: record.id,
            patient_id: record.patient_id,
            name: record.file_name.clone(),
            path: record.storage_path.clone(),
            creation_timestamp: record.created_at,
            minutes_since_creation: record.minutes_since_creation(),
            can_delete: self.allows(record.age_seconds),
        }
    }
}

impl Default for DeleteWindow {
    fn default() -> Self {
        Self {
            limit_seconds: i64::from(Self::DEFAULT_MINUTES) * 60,
        }
    }
}

/// 检查的对外视图，派生字段在读取时计算，不持久化
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyView {
    pub id: i64,
    pub patient_id: i64,
    pub name: String,
    pub path: String,
    pub creation_timestamp: DateTime<Utc>,
    pub minutes_since_creation: f64,
    pub can_delete: bool,
}
