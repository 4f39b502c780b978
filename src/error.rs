//! 错误类型
//!
//! 每个阶段各有自己的错误枚举，最终在编排层统一收敛为 [`AppError`]，
//! 再由 [`JobError`] 记录到任务的终态中。

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::utils::logging::truncate_text;

/// 日志与错误消息中上游响应体的最大展示长度
const BODY_PREVIEW_CHARS: usize = 2000;

// ========== HTTP 传输错误 ==========

/// HTTP 传输层错误
#[derive(Debug, Error)]
pub enum HttpError {
    /// 创建客户端失败
    #[error("无法创建 HTTP 客户端: {0}")]
    Build(#[source] reqwest::Error),
    /// 网络层失败（连接、超时等）
    #[error("请求 {url} 失败: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// 上游返回非 2xx
    #[error("{url} 返回 HTTP {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    /// 响应体不是预期的 JSON
    #[error("无法解析 {url} 的响应: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl HttpError {
    /// 上游 HTTP 状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 上游响应体
    pub fn body(&self) -> Option<&str> {
        match self {
            HttpError::Status { body, .. } | HttpError::Decode { body, .. } => Some(body),
            _ => None,
        }
    }
}

// ========== 提取阶段错误 ==========

/// 提取协议所处的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionPhase {
    Authenticate,
    CreateTransaction,
    UploadFile,
    StartTransaction,
    Poll,
    Download,
}

/// 提取服务错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("提取服务认证失败: {0}")]
    Auth(#[source] HttpError),
    #[error("提取服务认证响应缺少 access_token 字段")]
    MissingToken,
    #[error("创建事务失败: {0}")]
    Create(#[source] HttpError),
    #[error("创建事务响应缺少 transactionId 字段")]
    MissingTransactionId,
    #[error("上传文件失败: {0}")]
    Upload(#[source] HttpError),
    #[error("启动事务失败: {0}")]
    Start(#[source] HttpError),
    #[error("查询事务状态失败: {0}")]
    Poll(#[source] HttpError),
    #[error("提取服务处理失败，状态: {status}")]
    Processing { status: String },
    #[error("事务 {transaction_id} 已完成但没有结果文件")]
    MissingResultFile { transaction_id: String },
    #[error("下载提取结果失败: {0}")]
    Download(#[source] HttpError),
    #[error("轮询 {attempts} 次后提取仍未完成")]
    Timeout { attempts: u32 },
    #[error("提取已取消")]
    Cancelled,
}

impl ExtractionError {
    /// 出错时所处的协议步骤
    pub fn phase(&self) -> ExtractionPhase {
        match self {
            ExtractionError::Auth(_) | ExtractionError::MissingToken => {
                ExtractionPhase::Authenticate
            }
            ExtractionError::Create(_) | ExtractionError::MissingTransactionId => {
                ExtractionPhase::CreateTransaction
            }
            ExtractionError::Upload(_) => ExtractionPhase::UploadFile,
            ExtractionError::Start(_) => ExtractionPhase::StartTransaction,
            ExtractionError::Poll(_)
            | ExtractionError::Processing { .. }
            | ExtractionError::Timeout { .. }
            | ExtractionError::Cancelled => ExtractionPhase::Poll,
            ExtractionError::MissingResultFile { .. } | ExtractionError::Download(_) => {
                ExtractionPhase::Download
            }
        }
    }

    /// 上游 HTTP 状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        self.http().and_then(HttpError::status)
    }

    /// 提取服务报告的事务状态（如果有）
    pub fn provider_status(&self) -> Option<&str> {
        match self {
            ExtractionError::Processing { status } => Some(status),
            _ => None,
        }
    }

    fn http(&self) -> Option<&HttpError> {
        match self {
            ExtractionError::Auth(e)
            | ExtractionError::Create(e)
            | ExtractionError::Upload(e)
            | ExtractionError::Start(e)
            | ExtractionError::Poll(e)
            | ExtractionError::Download(e) => Some(e),
            _ => None,
        }
    }
}

// ========== 生成阶段错误 ==========

/// 生成失败的原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GenerationCause {
    /// 上游 HTTP 或 SDK 调用失败
    Upstream,
    /// 内容安全策略拦截
    Blocked,
    /// 返回了空文本
    EmptyText,
    /// 文本不是合法 JSON
    Parse,
    /// 响应结构不符合预期
    UnexpectedFormat,
}

/// 生成服务错误
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("生成服务请求失败: {0}")]
    Upstream(#[source] HttpError),
    #[error("生成服务调用失败 (模型: {model}): {message}")]
    Provider { model: String, message: String },
    #[error("响应被内容安全策略拦截，原因: {reason}")]
    Blocked { reason: String },
    #[error("生成服务返回了空文本")]
    EmptyText,
    #[error("无法将生成结果解析为 JSON: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        raw: String,
    },
    #[error("生成结果格式异常: {0}")]
    UnexpectedFormat(String),
}

impl GenerationError {
    pub fn cause(&self) -> GenerationCause {
        match self {
            GenerationError::Upstream(_) | GenerationError::Provider { .. } => {
                GenerationCause::Upstream
            }
            GenerationError::Blocked { .. } => GenerationCause::Blocked,
            GenerationError::EmptyText => GenerationCause::EmptyText,
            GenerationError::Parse { .. } => GenerationCause::Parse,
            GenerationError::UnexpectedFormat(_) => GenerationCause::UnexpectedFormat,
        }
    }
}

// ========== 配置 / 密钥 / 模板错误 ==========

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件解析失败: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("未知的文档类型: {0}")]
    UnknownDocumentType(String),
    #[error("未知的模型: {0}")]
    UnknownModel(String),
    #[error("缺少提供方配置: {0}")]
    MissingProvider(String),
    #[error("缺少接口配置: {0}")]
    MissingEndpoint(String),
    #[error("无法加载提示词模板 {reference}: {source}")]
    TemplateNotFound {
        reference: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP 客户端配置失败: {0}")]
    HttpClient(#[source] HttpError),
}

/// 密钥解析错误
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("无法从密钥库读取 {mount_point}/{path}: {source}")]
    Store {
        path: String,
        mount_point: String,
        #[source]
        source: HttpError,
    },
    #[error("密钥 {key} 不存在于 {mount_point}/{path}")]
    Missing {
        path: String,
        key: String,
        mount_point: String,
    },
    #[error("提供方 {provider} 未配置密钥字段 {field}")]
    NotConfigured { provider: String, field: String },
}

/// 提示词模板渲染错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("模板引用了未提供的占位符 {{{name}}}")]
    UnknownPlaceholder { name: String },
    #[error("模板包含无效的占位符 {text}")]
    InvalidPlaceholder { text: String },
    #[error("模板在位置 {position} 处存在未配对的花括号")]
    UnbalancedBrace { position: usize },
}

// ========== 应用错误 ==========

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("任务已取消: {0}")]
    Cancelled(String),
    #[error("读取文件 {path} 失败: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("任务执行异常: {0}")]
    Internal(String),
}

impl AppError {
    /// 对外暴露的错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Extraction(e) => match e {
                ExtractionError::Auth(_) | ExtractionError::MissingToken => ErrorKind::AuthError,
                ExtractionError::Create(_) | ExtractionError::MissingTransactionId => {
                    ErrorKind::CreateError
                }
                ExtractionError::Upload(_) => ErrorKind::UploadError,
                ExtractionError::Start(_) => ErrorKind::StartError,
                ExtractionError::Poll(_)
                | ExtractionError::Processing { .. }
                | ExtractionError::MissingResultFile { .. }
                | ExtractionError::Download(_) => ErrorKind::ProcessingError,
                ExtractionError::Timeout { .. } => ErrorKind::TimeoutError,
                ExtractionError::Cancelled => ErrorKind::Cancelled,
            },
            AppError::Generation(e) => match e.cause() {
                GenerationCause::Blocked => ErrorKind::BlockedError,
                GenerationCause::Parse => ErrorKind::ParseError,
                _ => ErrorKind::GenerationError,
            },
            AppError::Config(_) | AppError::Io { .. } => ErrorKind::ConfigError,
            AppError::Secret(_) => ErrorKind::SecretError,
            AppError::Template(_) => ErrorKind::TemplateError,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
            AppError::Json(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 失败调用携带的上游响应体
    pub fn upstream_body(&self) -> Option<&str> {
        let http = match self {
            AppError::Extraction(e) => e.http(),
            AppError::Generation(GenerationError::Upstream(e)) => Some(e),
            AppError::Secret(SecretError::Store { source, .. }) => Some(source),
            AppError::Config(ConfigError::HttpClient(e)) => Some(e),
            _ => None,
        };
        http.and_then(HttpError::body).filter(|body| !body.trim().is_empty())
    }

    /// 创建文件读取错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AuthError,
    CreateError,
    UploadError,
    StartError,
    ProcessingError,
    TimeoutError,
    BlockedError,
    ParseError,
    GenerationError,
    ConfigError,
    SecretError,
    TemplateError,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthError => "AuthError",
            ErrorKind::CreateError => "CreateError",
            ErrorKind::UploadError => "UploadError",
            ErrorKind::StartError => "StartError",
            ErrorKind::ProcessingError => "ProcessingError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::BlockedError => "BlockedError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::GenerationError => "GenerationError",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::SecretError => "SecretError",
            ErrorKind::TemplateError => "TemplateError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&AppError> for JobError {
    fn from(err: &AppError) -> Self {
        let mut message = err.to_string();
        if let Some(body) = err.upstream_body() {
            message.push_str(" | Response: ");
            message.push_str(&truncate_text(body, BODY_PREVIEW_CHARS));
        }
        JobError::new(err.kind(), message)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
