//! 文档分析流程 - 流程层
//!
//! 核心职责：定义"一个文档"的完整处理流程
//!
//! 流程顺序（固定，不可重排）：
//! 1. 解析文档类型与模型配置
//! 2. 读取提取服务凭据 → 提取 → 扁平化
//! 3. 加载模板 → 渲染提示词
//! 4. 读取生成服务凭据 → 生成 JSON
//!
//! 任何一步失败都直接返回错误，由编排层把任务标记为 Failed。

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{
    DocumentExtractor, ExtractionClient, ExtractionCredentials, GenerationCredentials,
    GeneratorFactory, ProviderGeneratorFactory,
};
use crate::config::{AppConfig, Config, GenerationProvider, ProviderSecrets};
use crate::error::{AppResult, ConfigError, SecretError};
use crate::infrastructure::{
    require_secret, CancelSignal, FileTemplateSource, HttpSettings, HttpTransport, SecretResolver,
    TemplateSource, VaultSecretResolver,
};
use crate::models::{AnalysisRequest, JobStage};
use crate::services::render_prompt;
use crate::utils::truncate_text;
use crate::workflow::analysis_ctx::AnalysisCtx;

/// 提取服务在 `providers` 中的名字
pub const EXTRACTION_PROVIDER: &str = "abbyy";

/// 流程向外报告进度
///
/// 由编排层的任务句柄实现，流程本身不持有任务状态。
pub trait JobProgress: Send + Sync {
    /// 进入下一个阶段
    fn advance(&self, stage: JobStage);
    /// 记录不终止任务的异常
    fn add_warning(&self, warning: String);
}

/// 文档分析流程
///
/// - 编排提取 → 渲染 → 生成
/// - 所有外部依赖都以 trait 对象注入
/// - 不持有任务状态，只通过 [`JobProgress`] 报告
pub struct AnalysisFlow {
    config: Arc<AppConfig>,
    secrets: Arc<dyn SecretResolver>,
    templates: Arc<dyn TemplateSource>,
    extractor: Arc<dyn DocumentExtractor>,
    generators: Arc<dyn GeneratorFactory>,
}

impl AnalysisFlow {
    pub fn new(
        config: Arc<AppConfig>,
        secrets: Arc<dyn SecretResolver>,
        templates: Arc<dyn TemplateSource>,
        extractor: Arc<dyn DocumentExtractor>,
        generators: Arc<dyn GeneratorFactory>,
    ) -> Self {
        Self {
            config,
            secrets,
            templates,
            extractor,
            generators,
        }
    }

    /// 使用真实的 Vault、模板目录和提供方客户端创建流程
    pub fn from_config(config: AppConfig, settings: &Config) -> AppResult<Self> {
        let http = config.http_settings();

        let vault_transport = HttpTransport::new(HttpSettings {
            tls_verify: settings.vault_tls_verify,
            ..http
        })
        .map_err(ConfigError::HttpClient)?;
        let secrets =
            VaultSecretResolver::new(vault_transport, &settings.vault_addr, &settings.vault_token);

        let extractor = ExtractionClient::new(
            config.api_endpoints.abbyy.clone(),
            http,
            config.poll_settings(),
        )
        .map_err(ConfigError::HttpClient)?;

        let generators = ProviderGeneratorFactory::from_config(&config);
        let templates = FileTemplateSource::new(&settings.template_dir);

        Ok(Self::new(
            Arc::new(config),
            Arc::new(secrets),
            Arc::new(templates),
            Arc::new(extractor),
            Arc::new(generators),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 执行一次完整分析，返回生成的 JSON
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        ctx: &AnalysisCtx,
        progress: &dyn JobProgress,
        cancel: &CancelSignal,
    ) -> AppResult<Value> {
        let doc_type = self.config.document_type(&request.doc_type_id)?;
        let model = self.config.ai_model(&request.model_id)?;

        // ========== 阶段 1: 提取 ==========
        progress.advance(JobStage::Extracting);
        info!(
            "{} 📄 开始提取 (skill: {}, {} 字节)",
            ctx,
            doc_type.abbyy_skill_id,
            request.document.bytes.len()
        );

        let credentials = self.extraction_credentials().await?;
        let outcome = self
            .extractor
            .extract(&request.document, &doc_type.abbyy_skill_id, &credentials, cancel)
            .await?;

        if let Some(warning) = &outcome.warning {
            warn!("{} ⚠️ {}", ctx, warning);
            progress.add_warning(warning.to_string());
        }
        info!("{} ✓ 提取完成，共 {} 个字段", ctx, outcome.fields.len());

        // ========== 阶段 2: 渲染提示词 ==========
        let template = self.templates.load(&doc_type.prompt_template).await?;
        let prompt = render_prompt(&template, &outcome.fields, &request.context_text)?;
        debug!("{} 提示词预览: {}", ctx, truncate_text(&prompt, 300));

        // ========== 阶段 3: 生成 ==========
        progress.advance(JobStage::Generating);
        info!("{} 🤖 调用模型 {} ({})", ctx, model.id, model.provider);

        let api_key = self.generation_api_key(model.provider).await?;
        let generator = self
            .generators
            .build(model, GenerationCredentials::new(api_key))?;
        let result = generator.generate(&prompt).await?;

        info!("{} ✅ 生成完成", ctx);
        Ok(result)
    }

    async fn extraction_credentials(&self) -> AppResult<ExtractionCredentials> {
        let provider = self.config.provider(EXTRACTION_PROVIDER)?;
        let client_id = self
            .provider_secret(
                EXTRACTION_PROVIDER,
                provider,
                provider.client_id_vault_key.as_deref(),
                "client_id_vault_key",
            )
            .await?;
        let client_secret = self
            .provider_secret(
                EXTRACTION_PROVIDER,
                provider,
                provider.client_secret_vault_key.as_deref(),
                "client_secret_vault_key",
            )
            .await?;

        Ok(ExtractionCredentials {
            client_id,
            client_secret,
        })
    }

    async fn generation_api_key(&self, provider: GenerationProvider) -> AppResult<String> {
        let name = provider.as_str();
        let secrets = self.config.provider(name)?;
        self.provider_secret(
            name,
            secrets,
            secrets.api_key_vault_key.as_deref(),
            "api_key_vault_key",
        )
        .await
    }

    async fn provider_secret(
        &self,
        name: &str,
        provider: &ProviderSecrets,
        key: Option<&str>,
        field: &str,
    ) -> AppResult<String> {
        let key = key.ok_or_else(|| SecretError::NotConfigured {
            provider: name.to_string(),
            field: field.to_string(),
        })?;

        Ok(require_secret(
            self.secrets.as_ref(),
            &provider.vault_secret_path,
            key,
            &provider.vault_mount_point,
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ExtractionCredentials, GenerationClient};
    use crate::config::AiModel;
    use crate::error::{AppError, ErrorKind, ExtractionError, GenerationError};
    use crate::infrastructure::{InMemoryTemplateSource, StaticSecretResolver};
    use crate::models::{DocumentUpload, ExtractedFieldMap};
    use crate::services::NormalizeOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    const CATALOG: &str = r#"
        [[document_types]]
        id = "tender"
        name = "Tender"
        abbyy_skill_id = "skill-1"
        prompt_template = "tender.txt"

        [[ai_models]]
        id = "gemini"
        name = "Gemini"
        provider = "google"

        [providers.abbyy]
        vault_secret_path = "abbyy"
        client_id_vault_key = "client_id"
        client_secret_vault_key = "client_secret"

        [providers.google]
        vault_secret_path = "gemini"
        api_key_vault_key = "api_key"

        [api_endpoints.abbyy]
        base_url = "https://vantage.test"
        auth_endpoint = "/auth"
        transactions_endpoint = "/transactions"
    "#;

    struct FixedExtractor;

    #[async_trait]
    impl DocumentExtractor for FixedExtractor {
        async fn extract(
            &self,
            _document: &DocumentUpload,
            skill_id: &str,
            credentials: &ExtractionCredentials,
            _cancel: &CancelSignal,
        ) -> Result<NormalizeOutcome, ExtractionError> {
            assert_eq!(skill_id, "skill-1");
            assert_eq!(credentials.client_secret, "secret");
            let mut fields = ExtractedFieldMap::new();
            fields.insert_scalar("title", json!("Tender A"));
            Ok(NormalizeOutcome {
                fields,
                warning: None,
            })
        }
    }

    /// 把提示词原样包进 JSON 返回
    struct EchoGenerator;

    #[async_trait]
    impl GenerationClient for EchoGenerator {
        fn provider(&self) -> GenerationProvider {
            GenerationProvider::Google
        }

        async fn generate(&self, prompt: &str) -> Result<Value, GenerationError> {
            Ok(json!({ "prompt": prompt }))
        }
    }

    struct EchoFactory;

    impl GeneratorFactory for EchoFactory {
        fn build(
            &self,
            _model: &AiModel,
            credentials: GenerationCredentials,
        ) -> Result<Box<dyn GenerationClient>, ConfigError> {
            assert_eq!(credentials.api_key, "g-key");
            Ok(Box::new(EchoGenerator))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        stages: Mutex<Vec<JobStage>>,
    }

    impl JobProgress for RecordingProgress {
        fn advance(&self, stage: JobStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn add_warning(&self, _warning: String) {}
    }

    fn flow(secrets: StaticSecretResolver) -> AnalysisFlow {
        AnalysisFlow::new(
            Arc::new(AppConfig::from_toml_str(CATALOG).unwrap()),
            Arc::new(secrets),
            Arc::new(
                InMemoryTemplateSource::new()
                    .with_template("tender.txt", "{extracted_data}\n---\n{manual_rag_text}"),
            ),
            Arc::new(FixedExtractor),
            Arc::new(EchoFactory),
        )
    }

    fn all_secrets() -> StaticSecretResolver {
        StaticSecretResolver::new()
            .with_secret("kv", "abbyy", "client_id", "id")
            .with_secret("kv", "abbyy", "client_secret", "secret")
            .with_secret("kv", "gemini", "api_key", "g-key")
    }

    fn request(doc_type_id: &str) -> AnalysisRequest {
        AnalysisRequest::new(
            DocumentUpload::new("a.pdf", "application/pdf", b"%PDF".to_vec()),
            doc_type_id,
            "gemini",
            "节能优先",
        )
    }

    fn ctx() -> AnalysisCtx {
        AnalysisCtx::new(Uuid::new_v4(), "a.pdf", "tender", "gemini")
    }

    #[tokio::test]
    async fn test_run_renders_extracted_fields_into_prompt() {
        let progress = RecordingProgress::default();
        let result = flow(all_secrets())
            .run(&request("tender"), &ctx(), &progress, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({ "prompt": "{\n  \"title\": \"Tender A\"\n}\n---\n节能优先" })
        );
        assert_eq!(
            *progress.stages.lock().unwrap(),
            vec![JobStage::Extracting, JobStage::Generating]
        );
    }

    #[tokio::test]
    async fn test_unknown_document_type_fails_before_extraction() {
        let progress = RecordingProgress::default();
        let err = flow(all_secrets())
            .run(&request("invoice"), &ctx(), &progress, &CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(progress.stages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_generation_key_is_secret_error() {
        let secrets = StaticSecretResolver::new()
            .with_secret("kv", "abbyy", "client_id", "id")
            .with_secret("kv", "abbyy", "client_secret", "secret");
        let progress = RecordingProgress::default();
        let err = flow(secrets)
            .run(&request("tender"), &ctx(), &progress, &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Secret(SecretError::Missing { .. })));
        assert_eq!(err.kind(), ErrorKind::SecretError);
    }
}
