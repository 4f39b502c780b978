/// 文档提取服务客户端
///
/// 封装提取服务的事务协议：认证 → 创建事务 → 上传文件 → 启动 → 轮询 → 下载，
/// 最后把结果扁平化为字段表。各步骤严格按顺序执行。
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::AbbyyEndpoints;
use crate::error::{ExtractionError, HttpError};
use crate::infrastructure::{CancelSignal, FilePart, HttpSettings, HttpTransport};
use crate::models::{DocumentUpload, ExtractionJob, ExtractionStatus};
use crate::services::normalize::{normalize, NormalizeOutcome};

const AUTH_SCOPE: &str = "openid permissions global.wildcard";

/// 提取服务凭据
#[derive(Clone)]
pub struct ExtractionCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ExtractionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// 轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

/// 文档提取能力
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        document: &DocumentUpload,
        skill_id: &str,
        credentials: &ExtractionCredentials,
        cancel: &CancelSignal,
    ) -> Result<NormalizeOutcome, ExtractionError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionResponse {
    transaction_id: Option<String>,
}

/// 提取服务客户端
pub struct ExtractionClient {
    transport: HttpTransport,
    endpoints: AbbyyEndpoints,
    poll: PollSettings,
}

impl ExtractionClient {
    /// 创建新的提取客户端
    pub fn new(
        endpoints: AbbyyEndpoints,
        http: HttpSettings,
        poll: PollSettings,
    ) -> Result<Self, HttpError> {
        let transport = HttpTransport::new(HttpSettings {
            tls_verify: endpoints.tls_verify,
            ..http
        })?;

        Ok(Self {
            transport,
            endpoints,
            poll,
        })
    }

    /// 执行完整的提取流程
    pub async fn run(
        &self,
        document: &DocumentUpload,
        skill_id: &str,
        credentials: &ExtractionCredentials,
        cancel: &CancelSignal,
    ) -> Result<NormalizeOutcome, ExtractionError> {
        let token = self.authenticate(credentials).await?;

        let mut job = self.create_transaction(&token, skill_id).await?;
        info!("📄 已创建提取事务 {} (skill: {})", job.job_id, job.skill_id);

        self.upload_file(&token, &job, document).await?;
        self.start_transaction(&token, &job).await?;

        let raw = self.poll_and_download(&token, &mut job, cancel).await?;
        info!("✓ 提取事务 {} 已完成", job.job_id);

        Ok(normalize(&raw))
    }

    /// 第一步：获取访问令牌
    pub async fn authenticate(
        &self,
        credentials: &ExtractionCredentials,
    ) -> Result<String, ExtractionError> {
        let url = format!("{}{}", self.endpoints.base_url, self.endpoints.auth_endpoint);
        debug!("提取服务认证: {}", url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", AUTH_SCOPE),
        ];

        let response: TokenResponse = self
            .transport
            .post_form(&url, &[], &form)
            .await
            .and_then(|r| r.success_json())
            .map_err(ExtractionError::Auth)?;

        response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(ExtractionError::MissingToken)
    }

    /// 第二步：创建事务
    pub async fn create_transaction(
        &self,
        token: &str,
        skill_id: &str,
    ) -> Result<ExtractionJob, ExtractionError> {
        let url = self.transactions_url(None);
        let auth = bearer(token);

        let response: CreateTransactionResponse = self
            .transport
            .post_json(
                &url,
                &[("Authorization", auth.as_str())],
                &json!({ "skillId": skill_id }),
            )
            .await
            .and_then(|r| r.success_json())
            .map_err(ExtractionError::Create)?;

        let transaction_id = response
            .transaction_id
            .filter(|id| !id.is_empty())
            .ok_or(ExtractionError::MissingTransactionId)?;

        Ok(ExtractionJob::new(transaction_id, skill_id))
    }

    /// 第三步：上传文件
    pub async fn upload_file(
        &self,
        token: &str,
        job: &ExtractionJob,
        document: &DocumentUpload,
    ) -> Result<(), ExtractionError> {
        let url = self.transactions_url(Some(&format!("{}/files", job.job_id)));
        let auth = bearer(token);
        debug!(
            "上传文件 {} ({} 字节, {})",
            document.file_name,
            document.bytes.len(),
            document.content_type
        );

        let file = FilePart {
            field: "file",
            file_name: &document.file_name,
            content_type: &document.content_type,
            bytes: &document.bytes,
        };

        self.transport
            .post_multipart(&url, &[("Authorization", auth.as_str())], file)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ExtractionError::Upload)?;

        Ok(())
    }

    /// 第四步：启动事务
    pub async fn start_transaction(
        &self,
        token: &str,
        job: &ExtractionJob,
    ) -> Result<(), ExtractionError> {
        let url = self.transactions_url(Some(&format!("{}/start", job.job_id)));
        let auth = bearer(token);

        self.transport
            .post_json(&url, &[("Authorization", auth.as_str())], &json!({}))
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ExtractionError::Start)?;

        Ok(())
    }

    /// 第五步：轮询事务状态，完成后下载结果
    ///
    /// 最多查询 `max_attempts` 次，两次查询之间等待 `interval`，
    /// 等待期间收到取消信号会立即返回 [`ExtractionError::Cancelled`]。
    pub async fn poll_and_download(
        &self,
        token: &str,
        job: &mut ExtractionJob,
        cancel: &CancelSignal,
    ) -> Result<Value, ExtractionError> {
        let status_url = self.transactions_url(Some(&job.job_id));
        let auth = bearer(token);
        let headers = [("Authorization", auth.as_str())];

        for attempt in 1..=self.poll.max_attempts {
            if cancel.is_cancelled() {
                return Err(ExtractionError::Cancelled);
            }

            let data: Value = self
                .transport
                .get(&status_url, &headers)
                .await
                .and_then(|r| r.success_json())
                .map_err(ExtractionError::Poll)?;

            let status = data
                .get("status")
                .and_then(Value::as_str)
                .map(ExtractionStatus::parse)
                .unwrap_or_else(|| ExtractionStatus::Other(String::new()));

            debug!(
                "事务 {} 状态: {} (第 {}/{} 次)",
                job.job_id, status, attempt, self.poll.max_attempts
            );
            job.status = status.clone();

            if status == ExtractionStatus::Processed {
                let file_id = result_file_id(&data).ok_or_else(|| {
                    ExtractionError::MissingResultFile {
                        transaction_id: job.job_id.clone(),
                    }
                })?;
                job.result_file_ref = Some(file_id.clone());
                return self.download_result(&headers, job, &file_id).await;
            }

            if status.is_failure() {
                warn!("⚠️ 事务 {} 处理失败，状态: {}", job.job_id, status);
                return Err(ExtractionError::Processing {
                    status: status.as_str().to_string(),
                });
            }

            if attempt < self.poll.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
                    _ = sleep(self.poll.interval) => {}
                }
            }
        }

        warn!(
            "⚠️ 事务 {} 轮询 {} 次仍未完成",
            job.job_id, self.poll.max_attempts
        );
        Err(ExtractionError::Timeout {
            attempts: self.poll.max_attempts,
        })
    }

    async fn download_result(
        &self,
        headers: &[(&str, &str)],
        job: &ExtractionJob,
        file_id: &str,
    ) -> Result<Value, ExtractionError> {
        let url = self.transactions_url(Some(&format!(
            "{}/files/{}/download",
            job.job_id, file_id
        )));
        debug!("下载提取结果: {}", url);

        self.transport
            .get(&url, headers)
            .await
            .and_then(|r| r.success_json())
            .map_err(ExtractionError::Download)
    }

    fn transactions_url(&self, suffix: Option<&str>) -> String {
        let base = format!(
            "{}{}",
            self.endpoints.base_url, self.endpoints.transactions_endpoint
        );
        match suffix {
            Some(suffix) => format!("{}/{}", base, suffix),
            None => base,
        }
    }
}

#[async_trait]
impl DocumentExtractor for ExtractionClient {
    async fn extract(
        &self,
        document: &DocumentUpload,
        skill_id: &str,
        credentials: &ExtractionCredentials,
        cancel: &CancelSignal,
    ) -> Result<NormalizeOutcome, ExtractionError> {
        self.run(document, skill_id, credentials, cancel).await
    }
}

/// 状态响应中第一个文档的第一个结果文件
fn result_file_id(data: &Value) -> Option<String> {
    let file_id = data.pointer("/documents/0/resultFiles/0/fileId")?;
    match file_id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
