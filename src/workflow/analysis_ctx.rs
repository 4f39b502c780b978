//! 分析任务上下文
//!
//! 封装"我正在处理哪个任务的哪个文件"这一信息，只用于日志

use std::fmt::Display;

use crate::models::{AnalysisJob, JobId};

/// 分析任务上下文
#[derive(Debug, Clone)]
pub struct AnalysisCtx {
    pub job_id: JobId,
    pub file_name: String,
    pub doc_type_id: String,
    pub model_id: String,
}

impl AnalysisCtx {
    pub fn new(
        job_id: JobId,
        file_name: impl Into<String>,
        doc_type_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            file_name: file_name.into(),
            doc_type_id: doc_type_id.into(),
            model_id: model_id.into(),
        }
    }

    pub fn from_job(job: &AnalysisJob) -> Self {
        Self::new(job.id, &job.file_name, &job.doc_type_id, &job.model_id)
    }

    /// 任务 ID 的前 8 位
    pub fn short_id(&self) -> String {
        self.job_id.simple().to_string()[..8].to_string()
    }
}

impl Display for AnalysisCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 #{} 文件 {} 类型 {}]",
            self.short_id(),
            self.file_name,
            self.doc_type_id
        )
    }
}
