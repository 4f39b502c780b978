//! 任务登记表 - 状态查询门面
//!
//! 每个任务对应一个 `watch` 通道：执行方持有发送端（[`JobHandle`]），
//! 登记表持有接收端，查询只读取最新值，不会等待执行方。

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ErrorKind, JobError};
use crate::infrastructure::{cancel_pair, CancelHandle, CancelSignal};
use crate::models::{AnalysisJob, JobId, JobStage, JobStatus};
use crate::workflow::JobProgress;

struct JobEntry {
    rx: watch::Receiver<AnalysisJob>,
    cancel: CancelHandle,
}

/// 任务登记表
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新任务，返回任务句柄和取消信号
    pub fn register(&self, job: AnalysisJob) -> (JobHandle, CancelSignal) {
        let id = job.id;
        let (tx, rx) = watch::channel(job);
        let (cancel, signal) = cancel_pair();

        self.write().insert(id, JobEntry { rx, cancel });
        debug!("登记任务 {}", id);

        (JobHandle { id, tx }, signal)
    }

    /// 查询任务状态，未知任务返回 `None`
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.read().get(id).map(|entry| entry.rx.borrow().status())
    }

    /// 完整的任务记录
    pub fn snapshot(&self, id: &JobId) -> Option<AnalysisJob> {
        self.read().get(id).map(|entry| entry.rx.borrow().clone())
    }

    /// 订阅任务记录的变化
    pub fn subscribe(&self, id: &JobId) -> Option<watch::Receiver<AnalysisJob>> {
        self.read().get(id).map(|entry| entry.rx.clone())
    }

    /// 请求取消任务
    ///
    /// 只有任务存在、尚未结束且此前没有取消过时返回 `true`。
    pub fn cancel(&self, id: &JobId) -> bool {
        let jobs = self.read();
        let Some(entry) = jobs.get(id) else {
            return false;
        };
        if entry.rx.borrow().is_terminal() {
            return false;
        }
        entry.cancel.cancel()
    }

    /// 移除已结束的任务并返回其最终记录
    ///
    /// 未知任务或仍在运行的任务返回 `None`，登记表保持不变。
    pub fn remove(&self, id: &JobId) -> Option<AnalysisJob> {
        let mut jobs = self.write();
        if !jobs.get(id)?.rx.borrow().is_terminal() {
            return None;
        }
        let entry = jobs.remove(id)?;
        debug!("移除任务 {}", id);
        let job = entry.rx.borrow().clone();
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 任务句柄
///
/// 唯一可以修改任务记录的地方，所有修改都经过状态机检查：
/// 进入 Succeeded 或 Failed 之后记录不再变化。
/// 句柄在任务结束前被丢弃（例如执行方 panic）时，任务记为 Failed。
pub struct JobHandle {
    id: JobId,
    tx: watch::Sender<AnalysisJob>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn snapshot(&self) -> AnalysisJob {
        self.tx.borrow().clone()
    }

    /// 进入非终态阶段
    pub fn advance(&self, stage: JobStage) -> bool {
        if stage.is_terminal() {
            return false;
        }
        self.transition(stage, |_| {})
    }

    /// 成功结束
    pub fn succeed(&self, result: Value) -> bool {
        self.transition(JobStage::Succeeded, |job| {
            job.result = Some(result);
        })
    }

    /// 失败结束
    pub fn fail(&self, error: JobError) -> bool {
        self.transition(JobStage::Failed, |job| {
            job.error = Some(error);
        })
    }

    /// 记录警告，任务结束后忽略
    pub fn add_warning(&self, warning: impl Into<String>) -> bool {
        let warning = warning.into();
        self.tx.send_if_modified(|job| {
            if job.is_terminal() {
                return false;
            }
            job.warnings.push(warning);
            job.updated_at = chrono::Utc::now();
            true
        })
    }

    fn transition(&self, next: JobStage, apply: impl FnOnce(&mut AnalysisJob)) -> bool {
        let changed = self.tx.send_if_modified(|job| {
            if !job.stage.can_transition_to(next) {
                return false;
            }
            job.stage = next;
            apply(job);
            job.updated_at = chrono::Utc::now();
            true
        });

        if changed {
            debug!("任务 {} → {}", self.id, next.as_str());
        } else {
            debug!("任务 {} 忽略非法迁移 → {}", self.id, next.as_str());
        }
        changed
    }
}

impl JobProgress for JobHandle {
    fn advance(&self, stage: JobStage) {
        JobHandle::advance(self, stage);
    }

    fn add_warning(&self, warning: String) {
        JobHandle::add_warning(self, warning);
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.tx.borrow().is_terminal() {
            warn!("⚠️ 任务 {} 在结束前被中断", self.id);
            self.fail(JobError::new(ErrorKind::Internal, "任务在结束前被中断"));
        }
    }
}
