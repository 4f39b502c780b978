//! 配置
//!
//! - [`Config`]：进程级设置，来自环境变量
//! - [`AppConfig`]：文档类型、模型、提供方与接口目录，来自 TOML 文件

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clients::PollSettings;
use crate::error::ConfigError;
use crate::infrastructure::HttpSettings;

/// 程序配置
#[derive(Clone)]
pub struct Config {
    /// 目录文件路径
    pub catalog_path: PathBuf,
    /// 提示词模板目录
    pub template_dir: PathBuf,
    /// Vault 地址
    pub vault_addr: String,
    /// Vault 访问令牌
    pub vault_token: String,
    /// 是否校验 Vault 的 TLS 证书
    pub vault_tls_verify: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 同时执行的分析任务数量
    pub max_concurrent_jobs: usize,
    /// 单个任务的超时时间（秒）
    pub job_timeout_secs: u64,
    /// 命令行查询任务状态的间隔（毫秒）
    pub status_poll_interval_ms: u64,
    /// 结果输出目录
    pub output_dir: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("catalog_path", &self.catalog_path)
            .field("template_dir", &self.template_dir)
            .field("vault_addr", &self.vault_addr)
            .field("vault_token", &"***")
            .field("vault_tls_verify", &self.vault_tls_verify)
            .field("verbose_logging", &self.verbose_logging)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("status_poll_interval_ms", &self.status_poll_interval_ms)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("config.toml"),
            template_dir: PathBuf::from("prompts"),
            vault_addr: "http://127.0.0.1:8200".to_string(),
            vault_token: String::new(),
            vault_tls_verify: true,
            verbose_logging: false,
            max_concurrent_jobs: 4,
            job_timeout_secs: 600,
            status_poll_interval_ms: 500,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            catalog_path: env_var("DOC_ANALYZER_CONFIG").map(PathBuf::from).unwrap_or(default.catalog_path),
            template_dir: env_var("TEMPLATE_DIR").map(PathBuf::from).unwrap_or(default.template_dir),
            vault_addr: env_var("VAULT_ADDR").unwrap_or(default.vault_addr),
            vault_token: env_var("VAULT_TOKEN").unwrap_or(default.vault_token),
            vault_tls_verify: env_parse("VAULT_TLS_VERIFY").unwrap_or(default.vault_tls_verify),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(default.max_concurrent_jobs),
            job_timeout_secs: env_parse("JOB_TIMEOUT_SECS").unwrap_or(default.job_timeout_secs),
            status_poll_interval_ms: env_parse("STATUS_POLL_INTERVAL_MS").unwrap_or(default.status_poll_interval_ms),
            output_dir: env_var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(default.output_dir),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}

// ========== 目录 ==========

/// 文档类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: String,
    pub name: String,
    /// 提取服务的 skill
    pub abbyy_skill_id: String,
    /// 提示词模板引用
    pub prompt_template: String,
}

/// 生成服务提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// 对话补全风格
    OpenAi,
    /// 直接生成风格
    Google,
}

impl GenerationProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationProvider::OpenAi => "openai",
            GenerationProvider::Google => "google",
        }
    }
}

impl fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生成模型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiModel {
    pub id: String,
    pub name: String,
    pub provider: GenerationProvider,
}

/// 提供方凭据在密钥库中的位置
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSecrets {
    #[serde(default = "default_mount_point")]
    pub vault_mount_point: String,
    pub vault_secret_path: String,
    pub client_id_vault_key: Option<String>,
    pub client_secret_vault_key: Option<String>,
    pub api_key_vault_key: Option<String>,
}

fn default_mount_point() -> String {
    "kv".to_string()
}

fn default_true() -> bool {
    true
}

/// 提取服务接口
#[derive(Debug, Clone, Deserialize)]
pub struct AbbyyEndpoints {
    pub base_url: String,
    pub auth_endpoint: String,
    pub transactions_endpoint: String,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

/// 直接生成服务接口
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiEndpoints {
    pub base_url: String,
    /// 包含 `{model_name}` 占位符
    pub generate_content_path: String,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

/// 对话补全服务接口
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiEndpoints {
    /// 不填时使用 SDK 默认地址
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEndpoints {
    pub abbyy: AbbyyEndpoints,
    pub google_gemini: Option<GeminiEndpoints>,
    #[serde(default)]
    pub openai: OpenAiEndpoints,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_poll_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpTimeouts {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

/// 对外公开的目录（不含密钥位置）
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub document_types: Vec<DocumentType>,
    pub ai_models: Vec<AiModel>,
}

/// 应用目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub document_types: Vec<DocumentType>,
    #[serde(default)]
    pub ai_models: Vec<AiModel>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSecrets>,
    pub api_endpoints: ApiEndpoints,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub http: HttpTimeouts,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 从 TOML 文件加载目录
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub fn document_type(&self, id: &str) -> Result<&DocumentType, ConfigError> {
        self.document_types
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ConfigError::UnknownDocumentType(id.to_string()))
    }

    pub fn ai_model(&self, id: &str) -> Result<&AiModel, ConfigError> {
        self.ai_models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ConfigError::UnknownModel(id.to_string()))
    }

    pub fn provider(&self, name: &str) -> Result<&ProviderSecrets, ConfigError> {
        self.providers
            .get(name)
            .ok_or_else(|| ConfigError::MissingProvider(name.to_string()))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            document_types: self.document_types.clone(),
            ai_models: self.ai_models.clone(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.extraction.poll_interval_secs),
            max_attempts: self.extraction.max_poll_attempts,
        }
    }

    /// 默认开启 TLS 校验，各提供方再按自己的 `tls_verify` 覆盖
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            tls_verify: true,
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http.request_timeout_secs),
        }
    }
}
