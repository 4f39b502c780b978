use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::JobError;
use crate::models::request::AnalysisRequest;

/// 分析任务 ID
pub type JobId = Uuid;

/// 分析任务所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    Pending,
    Extracting,
    Generating,
    Succeeded,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Succeeded | JobStage::Failed)
    }

    /// 状态机允许的迁移
    pub fn can_transition_to(self, next: JobStage) -> bool {
        match (self, next) {
            (JobStage::Pending, JobStage::Extracting)
            | (JobStage::Extracting, JobStage::Generating)
            | (JobStage::Generating, JobStage::Succeeded) => true,
            (current, JobStage::Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Pending => "Pending",
            JobStage::Extracting => "Extracting",
            JobStage::Generating => "Generating",
            JobStage::Succeeded => "Succeeded",
            JobStage::Failed => "Failed",
        }
    }
}

/// 分析任务记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: JobId,
    pub stage: JobStage,
    pub result: Option<Value>,
    pub error: Option<JobError>,
    /// 不终止任务的异常（例如提取结果结构异常）
    pub warnings: Vec<String>,
    pub file_name: String,
    pub doc_type_id: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// 新建处于 Pending 的任务
    pub fn pending(request: &AnalysisRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stage: JobStage::Pending,
            result: None,
            error: None,
            warnings: Vec::new(),
            file_name: request.document.file_name.clone(),
            doc_type_id: request.doc_type_id.clone(),
            model_id: request.model_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// 对外暴露的状态视图
    pub fn status(&self) -> JobStatus {
        JobStatus {
            stage: self.stage,
            result: self.result.clone(),
            error: self.error.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// 状态查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub stage: JobStage,
    pub result: Option<Value>,
    pub error: Option<JobError>,
    pub warnings: Vec<String>,
}
