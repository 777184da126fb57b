//! # DICOM-lite 工作流模块
//!
//! 检查生命周期管理：上传、列表、删除，以及删除窗口策略。
//!
//! 一条检查的状态只随时间单向变化：
//! `Created → Listable → {Deleted | Expired}`，过期后不可删除但仍可列出。

pub mod lifecycle;
pub mod state_machine;
pub mod window;

pub use lifecycle::{DeleteOutcome, StudyLifecycleManager, StudyListing};
pub use state_machine::{StudyEvent, StudyPhase, StudyStateMachine};
pub use window::{DeleteWindow, StudyView};
