//! 存储网关接口

use async_trait::async_trait;
use dicomlite_core::{NewStudy, Patient, Result, StudyRecord, UserCredentials};

/// 存储网关
///
/// 生命周期管理器只依赖此接口，不接触任何 SQL 方言。
/// 返回的每条检查记录都带有由网关时钟（数据库 `NOW()`）计算的 `age_seconds`。
#[async_trait]
pub trait StudyGateway: Send + Sync {
    /// 方言名称，用于日志
    fn name(&self) -> &'static str;

    /// 建表（仅 `IF NOT EXISTS`，不做迁移）
    async fn create_tables(&self) -> Result<()>;

    /// 全部患者，按姓名排序
    async fn get_patients(&self) -> Result<Vec<Patient>>;

    async fn find_patient(&self, patient_id: i64) -> Result<Option<Patient>>;

    /// 患者的全部检查，按创建时间倒序
    async fn get_studies_for_patient(&self, patient_id: i64) -> Result<Vec<StudyRecord>>;

    /// 插入检查记录，创建时间取存储层时钟
    async fn insert_study(&self, study: &NewStudy) -> Result<StudyRecord>;

    async fn find_study(&self, study_id: i64) -> Result<Option<StudyRecord>>;

    /// 对检查记录加排他锁
    ///
    /// 记录不存在时返回 `None`。同一记录上的并发调用会等待前一个锁释放，
    /// 若前一个调用已删除该行，后来者得到 `None`。
    async fn lock_study(&self, study_id: i64) -> Result<Option<Box<dyn StudyLock>>>;

    async fn find_user(&self, username: &str) -> Result<Option<UserCredentials>>;
}

/// 持有一条检查记录排他锁的句柄
#[async_trait]
pub trait StudyLock: Send {
    /// 加锁时读到的记录（含加锁时刻的 `age_seconds`）
    fn record(&self) -> &StudyRecord;

    /// 删除该行并提交，释放锁
    async fn delete_study_row(self: Box<Self>) -> Result<()>;

    /// 不做修改，释放锁
    async fn release(self: Box<Self>) -> Result<()>;
}
