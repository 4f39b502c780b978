use std::fmt;

/// 提取服务的事务状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    Created,
    Started,
    Processing,
    Processed,
    Error,
    Cancelled,
    ProcessingFailed,
    /// 未识别的状态，继续轮询
    Other(String),
}

impl ExtractionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Created" => ExtractionStatus::Created,
            "Started" => ExtractionStatus::Started,
            "Processing" => ExtractionStatus::Processing,
            "Processed" => ExtractionStatus::Processed,
            "Error" => ExtractionStatus::Error,
            "Cancelled" => ExtractionStatus::Cancelled,
            "ProcessingFailed" => ExtractionStatus::ProcessingFailed,
            other => ExtractionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExtractionStatus::Created => "Created",
            ExtractionStatus::Started => "Started",
            ExtractionStatus::Processing => "Processing",
            ExtractionStatus::Processed => "Processed",
            ExtractionStatus::Error => "Error",
            ExtractionStatus::Cancelled => "Cancelled",
            ExtractionStatus::ProcessingFailed => "ProcessingFailed",
            ExtractionStatus::Other(s) => s,
        }
    }

    /// 失败终态
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExtractionStatus::Error
                | ExtractionStatus::Cancelled
                | ExtractionStatus::ProcessingFailed
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == ExtractionStatus::Processed || self.is_failure()
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次提取事务
///
/// 只在一次分析请求内存在，状态完全由轮询结果驱动。
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    /// 提取服务返回的 transactionId
    pub job_id: String,
    pub skill_id: String,
    pub status: ExtractionStatus,
    /// 结果文件 ID
    pub result_file_ref: Option<String>,
}

impl ExtractionJob {
    pub fn new(job_id: impl Into<String>, skill_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            skill_id: skill_id.into(),
            status: ExtractionStatus::Created,
            result_file_ref: None,
        }
    }
}
