//! 生成服务抽象
//!
//! 两种风格的提供方（对话补全 / 直接生成）都实现 [`GenerationClient`]，
//! 具体用哪一个由 [`GeneratorFactory`] 在任务开始时按模型配置决定一次。

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::clients::gemini_client::DirectGenerationGenerator;
use crate::clients::llm_client::ChatCompletionGenerator;
use crate::config::{AiModel, AppConfig, GeminiEndpoints, GenerationProvider};
use crate::error::{ConfigError, GenerationError};
use crate::infrastructure::HttpSettings;

/// 生成服务凭据
#[derive(Clone)]
pub struct GenerationCredentials {
    pub api_key: String,
}

impl GenerationCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for GenerationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationCredentials")
            .field("api_key", &"***")
            .finish()
    }
}

/// 生成能力：提交提示词，返回解析后的 JSON
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn provider(&self) -> GenerationProvider;

    async fn generate(&self, prompt: &str) -> Result<Value, GenerationError>;
}

/// 按模型构造生成客户端
pub trait GeneratorFactory: Send + Sync {
    fn build(
        &self,
        model: &AiModel,
        credentials: GenerationCredentials,
    ) -> Result<Box<dyn GenerationClient>, ConfigError>;
}

/// 根据 [`GenerationProvider`] 选择实现
#[derive(Debug, Clone)]
pub struct ProviderGeneratorFactory {
    openai_base_url: Option<String>,
    gemini: Option<GeminiEndpoints>,
    http: HttpSettings,
}

impl ProviderGeneratorFactory {
    pub fn new(
        openai_base_url: Option<String>,
        gemini: Option<GeminiEndpoints>,
        http: HttpSettings,
    ) -> Self {
        Self {
            openai_base_url,
            gemini,
            http,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.api_endpoints.openai.base_url.clone(),
            config.api_endpoints.google_gemini.clone(),
            config.http_settings(),
        )
    }
}

impl GeneratorFactory for ProviderGeneratorFactory {
    fn build(
        &self,
        model: &AiModel,
        credentials: GenerationCredentials,
    ) -> Result<Box<dyn GenerationClient>, ConfigError> {
        match model.provider {
            GenerationProvider::OpenAi => Ok(Box::new(ChatCompletionGenerator::new(
                &model.id,
                credentials,
                self.openai_base_url.as_deref(),
            ))),
            GenerationProvider::Google => {
                let endpoints = self
                    .gemini
                    .clone()
                    .ok_or_else(|| ConfigError::MissingEndpoint("google_gemini".to_string()))?;
                let generator =
                    DirectGenerationGenerator::new(&model.id, credentials, endpoints, self.http)
                        .map_err(ConfigError::HttpClient)?;
                Ok(Box::new(generator))
            }
        }
    }
}

/// 把模型返回的文本解析为 JSON
pub fn parse_json_text(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyText);
    }
    serde_json::from_str(trimmed).map_err(|source| GenerationError::Parse {
        source,
        raw: trimmed.to_string(),
    })
}
