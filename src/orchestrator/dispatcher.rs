//! 任务调度器 - 编排层
//!
//! 提交的每个分析请求都在 tokio 运行时上独立执行，
//! 由 Semaphore 限制同时运行的数量。显式取消和单任务超时都会让任务以
//! `Cancelled` 失败结束，不会遗留在轮询等待中。

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::{AppError, ErrorKind, JobError};
use crate::infrastructure::CancelSignal;
use crate::models::{AnalysisJob, AnalysisRequest, JobId, JobStatus};
use crate::orchestrator::job_registry::{JobHandle, JobRegistry};
use crate::workflow::{AnalysisCtx, AnalysisFlow};

/// 任务调度器
pub struct JobDispatcher {
    flow: Arc<AnalysisFlow>,
    registry: Arc<JobRegistry>,
    semaphore: Arc<Semaphore>,
    job_timeout: Option<Duration>,
}

impl JobDispatcher {
    /// 创建调度器，`job_timeout` 为 `None` 时不限时
    pub fn new(
        flow: Arc<AnalysisFlow>,
        max_concurrent: usize,
        job_timeout: Option<Duration>,
    ) -> Self {
        Self {
            flow,
            registry: Arc::new(JobRegistry::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            job_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// 提交分析请求，立即返回任务 ID
    ///
    /// 必须在 tokio 运行时中调用。
    pub fn submit(&self, request: AnalysisRequest) -> JobId {
        let (handle, cancel) = self.registry.register(AnalysisJob::pending(&request));
        let id = handle.id();
        info!("📥 已提交任务 {} ({})", id, request.document.file_name);

        tokio::spawn(execute_job(
            self.flow.clone(),
            request,
            handle,
            cancel,
            self.semaphore.clone(),
            self.job_timeout,
        ));

        id
    }

    /// 查询任务状态
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.registry.status(id)
    }

    /// 取消任务
    pub fn cancel(&self, id: &JobId) -> bool {
        let cancelled = self.registry.cancel(id);
        if cancelled {
            info!("🛑 已请求取消任务 {}", id);
        }
        cancelled
    }

    /// 等待任务结束，返回最终记录
    pub async fn wait(&self, id: &JobId) -> Option<AnalysisJob> {
        let mut rx = self.registry.subscribe(id)?;
        let terminal = rx
            .wait_for(AnalysisJob::is_terminal)
            .await
            .map(|job| job.clone());
        Some(terminal.unwrap_or_else(|_| rx.borrow().clone()))
    }
}

/// 执行单个任务，保证任务以且仅以一个终态结束
async fn execute_job(
    flow: Arc<AnalysisFlow>,
    request: AnalysisRequest,
    handle: JobHandle,
    cancel: CancelSignal,
    semaphore: Arc<Semaphore>,
    job_timeout: Option<Duration>,
) {
    let ctx = AnalysisCtx::from_job(&handle.snapshot());

    // 排队期间也可以取消
    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                handle.fail(JobError::new(ErrorKind::Internal, "调度器已关闭"));
                return;
            }
        },
        _ = cancel.cancelled() => {
            info!("{} 🛑 任务在排队时被取消", ctx);
            let cancelled = AppError::Cancelled("任务在排队时被取消".to_string());
            handle.fail(JobError::from(&cancelled));
            return;
        }
    };

    let outcome = tokio::select! {
        result = flow.run(&request, &ctx, &handle, &cancel) => result,
        _ = cancel.cancelled() => Err(AppError::Cancelled("任务被取消".to_string())),
        _ = deadline(job_timeout) => Err(AppError::Cancelled(format!(
            "任务超过 {} 秒时限",
            job_timeout.map(|d| d.as_secs()).unwrap_or_default()
        ))),
    };

    match outcome {
        Ok(result) => {
            handle.succeed(result);
            info!("{} ✅ 任务成功", ctx);
        }
        Err(err) => {
            let job_error = JobError::from(&err);
            error!("{} ❌ 任务失败: {}", ctx, job_error);
            handle.fail(job_error);
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => sleep(timeout).await,
        None => pending::<()>().await,
    }
}
