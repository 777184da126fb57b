//! 检查状态机
//!
//! 管理上传检查的生命周期状态转换。过期没有显式事件，
//! 由读取时的时钟推断，见 `DeleteWindow::phase`。

use dicomlite_core::{DicomLiteError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 检查生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StudyPhase {
    Created,  // 文件已写入，记录尚未插入
    Listable, // 在删除窗口内
    Expired,  // 窗口已过，永久不可删除
    Deleted,
}

/// 检查状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StudyEvent {
    Persisted,
    WindowElapsed,
    Delete,
}

/// 检查状态机
#[derive(Debug)]
pub struct StudyStateMachine {
    transitions: HashMap<(StudyPhase, StudyEvent), StudyPhase>,
}

impl StudyStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((StudyPhase::Created, StudyEvent::Persisted), StudyPhase::Listable);
        transitions.insert((StudyPhase::Listable, StudyEvent::WindowElapsed), StudyPhase::Expired);
        transitions.insert((StudyPhase::Listable, StudyEvent::Delete), StudyPhase::Deleted);

        Self { transitions }
    }

    /// 执行状态转换
    pub fn transition(&self, from: &StudyPhase, event: &StudyEvent) -> Result<StudyPhase> {
        match self.transitions.get(&(*from, *event)) {
            Some(to) => Ok(*to),
            None => Err(DicomLiteError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for StudyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
