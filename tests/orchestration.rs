//! 调度器与状态查询门面的端到端测试
//!
//! 一部分测试把真实的提取客户端和直接生成客户端接到 wiremock 上，
//! 其余用替身隔离单个阶段。

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doc_analyzer::clients::{
    DocumentExtractor, ExtractionClient, ExtractionCredentials, GenerationClient,
    GenerationCredentials, GeneratorFactory, PollSettings, ProviderGeneratorFactory,
};
use doc_analyzer::config::{AiModel, AppConfig, GenerationProvider};
use doc_analyzer::error::{ConfigError, ErrorKind, ExtractionError, GenerationError};
use doc_analyzer::infrastructure::{
    CancelSignal, HttpSettings, InMemoryTemplateSource, StaticSecretResolver,
};
use doc_analyzer::models::{AnalysisJob, DocumentUpload, ExtractedFieldMap, JobStage};
use doc_analyzer::services::{normalize, NormalizeOutcome};
use doc_analyzer::{AnalysisFlow, AnalysisRequest, App, Config, JobDispatcher};

const CATALOG: &str = r#"
    [[document_types]]
    id = "tender"
    name = "Tender"
    abbyy_skill_id = "skill-42"
    prompt_template = "tender.txt"

    [[document_types]]
    id = "broken"
    name = "Broken template"
    abbyy_skill_id = "skill-42"
    prompt_template = "broken.txt"

    [[document_types]]
    id = "orphan"
    name = "Template missing"
    abbyy_skill_id = "skill-42"
    prompt_template = "missing.txt"

    [[ai_models]]
    id = "gemini-pro"
    name = "Gemini Pro"
    provider = "google"

    [providers.abbyy]
    vault_secret_path = "abbyy"
    client_id_vault_key = "client_id"
    client_secret_vault_key = "client_secret"

    [providers.google]
    vault_secret_path = "gemini"
    api_key_vault_key = "api_key"

    [api_endpoints.abbyy]
    base_url = "http://placeholder.invalid"
    auth_endpoint = "/auth2/connect/token"
    transactions_endpoint = "/api/publicapi/v1/transactions"

    [api_endpoints.google_gemini]
    base_url = "http://placeholder.invalid"
    generate_content_path = "/v1beta/models/{model_name}:generateContent"
"#;

const TRANSACTIONS: &str = "/api/publicapi/v1/transactions";

fn catalog(base_url: &str) -> AppConfig {
    let mut config = AppConfig::from_toml_str(CATALOG).expect("目录解析失败");
    config.api_endpoints.abbyy.base_url = base_url.to_string();
    if let Some(gemini) = config.api_endpoints.google_gemini.as_mut() {
        gemini.base_url = base_url.to_string();
    }
    config
}

fn secrets() -> StaticSecretResolver {
    StaticSecretResolver::new()
        .with_secret("kv", "abbyy", "client_id", "id")
        .with_secret("kv", "abbyy", "client_secret", "secret")
        .with_secret("kv", "gemini", "api_key", "g-key")
}

fn templates() -> InMemoryTemplateSource {
    InMemoryTemplateSource::new()
        .with_template(
            "tender.txt",
            concat!(
                "根据以下数据写方案，返回 {{\"title\": ...}}:\n",
                "{extracted_data}\n补充: {manual_rag_text}",
            ),
        )
        .with_template("broken.txt", "{extracted_data} {deadline}")
}

fn request(doc_type_id: &str) -> AnalysisRequest {
    AnalysisRequest::new(
        DocumentUpload::new("tender.pdf", "application/pdf", b"%PDF-1.4".to_vec()),
        doc_type_id,
        "gemini-pro",
        "节能优先",
    )
}

fn assert_exactly_one_terminal(job: &AnalysisJob) {
    match job.stage {
        JobStage::Succeeded => {
            assert!(job.result.is_some(), "成功的任务必须有结果");
            assert!(job.error.is_none(), "成功的任务不能有错误");
        }
        JobStage::Failed => {
            assert!(job.error.is_some(), "失败的任务必须有错误");
            assert!(job.result.is_none(), "失败的任务不能有结果");
        }
        other => panic!("任务未结束: {:?}", other),
    }
}

// ========== 替身 ==========

/// 返回固定结果的提取替身
struct FixedExtractor(NormalizeOutcome);

#[async_trait]
impl DocumentExtractor for FixedExtractor {
    async fn extract(
        &self,
        _document: &DocumentUpload,
        _skill_id: &str,
        _credentials: &ExtractionCredentials,
        _cancel: &CancelSignal,
    ) -> Result<NormalizeOutcome, ExtractionError> {
        Ok(self.0.clone())
    }
}

/// 永远不返回的提取替身
struct HangingExtractor;

#[async_trait]
impl DocumentExtractor for HangingExtractor {
    async fn extract(
        &self,
        _document: &DocumentUpload,
        _skill_id: &str,
        _credentials: &ExtractionCredentials,
        _cancel: &CancelSignal,
    ) -> Result<NormalizeOutcome, ExtractionError> {
        std::future::pending().await
    }
}

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
        _credentials: GenerationCredentials,
    ) -> Result<Box<dyn GenerationClient>, ConfigError> {
        Ok(Box::new(EchoGenerator))
    }
}

fn fields() -> NormalizeOutcome {
    let mut fields = ExtractedFieldMap::new();
    fields.insert_scalar("title", json!("Tender A"));
    NormalizeOutcome {
        fields,
        warning: None,
    }
}

fn dispatcher_with(
    extractor: Arc<dyn DocumentExtractor>,
    secrets: StaticSecretResolver,
    max_concurrent: usize,
    timeout: Option<Duration>,
) -> JobDispatcher {
    let flow = AnalysisFlow::new(
        Arc::new(catalog("http://placeholder.invalid")),
        Arc::new(secrets),
        Arc::new(templates()),
        extractor,
        Arc::new(EchoFactory),
    );
    JobDispatcher::new(Arc::new(flow), max_concurrent, timeout)
}

// ========== 接入模拟服务的端到端测试 ==========

async fn mount_extraction(server: &MockServer, final_status: &str) {
    Mock::given(method("POST"))
        .and(path("/auth2/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(TRANSACTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "transactionId": "tx-1" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/tx-1/files", TRANSACTIONS)))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/tx-1/start", TRANSACTIONS)))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tx-1", TRANSACTIONS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": final_status,
            "documents": [{ "resultFiles": [{ "fileId": "f-1" }] }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tx-1/files/f-1/download", TRANSACTIONS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Transaction": { "Documents": [{ "ExtractedData": { "RootObject": { "Fields": [
                { "Name": "title", "List": [{ "Value": "Tender A" }] }
            ] } } }] }
        })))
        .mount(server)
        .await;
}

async fn mount_generation(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn live_dispatcher(server: &MockServer) -> JobDispatcher {
    let config = catalog(&server.uri());
    let extractor = ExtractionClient::new(
        config.api_endpoints.abbyy.clone(),
        HttpSettings::default(),
        PollSettings {
            interval: Duration::from_millis(10),
            max_attempts: 30,
        },
    )
    .unwrap();
    let generators = ProviderGeneratorFactory::from_config(&config);

    let flow = AnalysisFlow::new(
        Arc::new(config),
        Arc::new(secrets()),
        Arc::new(templates()),
        Arc::new(extractor),
        Arc::new(generators),
    );
    JobDispatcher::new(Arc::new(flow), 2, Some(Duration::from_secs(30)))
}

#[tokio::test]
async fn test_end_to_end_success() {
    let server = MockServer::start().await;
    mount_extraction(&server, "Processed").await;
    mount_generation(
        &server,
        json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"title\": \"Proposal A\"}" }] } }]
        }),
    )
    .await;

    let dispatcher = live_dispatcher(&server);
    let id = dispatcher.submit(request("tender"));
    let job = dispatcher.wait(&id).await.unwrap();

    assert_exactly_one_terminal(&job);
    assert_eq!(job.stage, JobStage::Succeeded);
    assert_eq!(job.result, Some(json!({ "title": "Proposal A" })));

    let requests = server.received_requests().await.unwrap_or_default();
    let generate = requests
        .iter()
        .find(|r| r.url.path().ends_with(":generateContent"))
        .expect("应调用生成服务");
    let body: Value = serde_json::from_slice(&generate.body).unwrap();
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("\"title\": \"Tender A\""));
    assert!(prompt.contains("返回 {\"title\": ...}"));
    assert!(prompt.ends_with("补充: 节能优先"));
}

#[tokio::test]
async fn test_safety_block_fails_job_with_blocked_error() {
    let server = MockServer::start().await;
    mount_extraction(&server, "Processed").await;
    mount_generation(&server, json!({ "promptFeedback": { "blockReason": "SAFETY" } })).await;

    let dispatcher = live_dispatcher(&server);
    let id = dispatcher.submit(request("tender"));
    let job = dispatcher.wait(&id).await.unwrap();

    assert_exactly_one_terminal(&job);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::BlockedError);
    assert!(error.message.contains("SAFETY"));
}

#[tokio::test]
async fn test_provider_processing_failure_fails_job() {
    let server = MockServer::start().await;
    mount_extraction(&server, "ProcessingFailed").await;

    let dispatcher = live_dispatcher(&server);
    let id = dispatcher.submit(request("tender"));
    let job = dispatcher.wait(&id).await.unwrap();

    assert_exactly_one_terminal(&job);
    assert_eq!(job.error.unwrap().kind, ErrorKind::ProcessingError);

    let generate_calls = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().ends_with(":generateContent"))
        .count();
    assert_eq!(generate_calls, 0);
}

// ========== 替身测试 ==========

#[tokio::test]
async fn test_configuration_failures_map_to_error_kinds() {
    let dispatcher = dispatcher_with(Arc::new(FixedExtractor(fields())), secrets(), 4, None);

    let cases = [
        ("invoice", ErrorKind::ConfigError),
        ("orphan", ErrorKind::ConfigError),
        ("broken", ErrorKind::TemplateError),
    ];

    for (doc_type_id, kind) in cases {
        let id = dispatcher.submit(request(doc_type_id));
        let job = dispatcher.wait(&id).await.unwrap();
        assert_exactly_one_terminal(&job);
        assert_eq!(job.error.unwrap().kind, kind, "doc_type_id = {}", doc_type_id);
    }
}

#[tokio::test]
async fn test_missing_secret_fails_job() {
    let partial = StaticSecretResolver::new().with_secret("kv", "abbyy", "client_id", "id");
    let dispatcher = dispatcher_with(Arc::new(FixedExtractor(fields())), partial, 4, None);

    let id = dispatcher.submit(request("tender"));
    let job = dispatcher.wait(&id).await.unwrap();

    assert_exactly_one_terminal(&job);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::SecretError);
    assert!(error.message.contains("client_secret"));
}

#[tokio::test]
async fn test_degraded_extraction_is_reported_as_warning() {
    let degraded = normalize(&json!({ "Transaction": "unexpected" }));
    let dispatcher = dispatcher_with(Arc::new(FixedExtractor(degraded)), secrets(), 4, None);

    let id = dispatcher.submit(request("tender"));
    let job = dispatcher.wait(&id).await.unwrap();

    assert_exactly_one_terminal(&job);
    assert_eq!(job.stage, JobStage::Succeeded);
    assert_eq!(job.warnings.len(), 1);
    let prompt = job.result.unwrap()["prompt"].as_str().unwrap().to_string();
    assert!(prompt.contains("Failed to parse the extraction JSON structure."));
}

#[tokio::test]
async fn test_cancel_running_job() {
    let dispatcher = dispatcher_with(Arc::new(HangingExtractor), secrets(), 4, None);
    let id = dispatcher.submit(request("tender"));

    let mut rx = dispatcher.registry().subscribe(&id).unwrap();
    rx.wait_for(|job| job.stage == JobStage::Extracting).await.unwrap();

    assert!(dispatcher.cancel(&id));
    let job = tokio::time::timeout(Duration::from_secs(5), dispatcher.wait(&id))
        .await
        .expect("取消后任务应很快结束")
        .unwrap();

    assert_exactly_one_terminal(&job);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Cancelled);
    assert!(!dispatcher.cancel(&id));
}

#[tokio::test]
async fn test_job_timeout_fails_as_cancelled() {
    let dispatcher = dispatcher_with(
        Arc::new(HangingExtractor),
        secrets(),
        4,
        Some(Duration::from_millis(50)),
    );
    let id = dispatcher.submit(request("tender"));
    let job = tokio::time::timeout(Duration::from_secs(5), dispatcher.wait(&id))
        .await
        .expect("超时后任务应结束")
        .unwrap();

    assert_exactly_one_terminal(&job);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert!(error.message.contains("时限"));
}

#[tokio::test]
async fn test_queued_job_waits_for_permit_and_can_be_cancelled() {
    let dispatcher = dispatcher_with(Arc::new(HangingExtractor), secrets(), 1, None);

    let first = dispatcher.submit(request("tender"));
    let mut rx = dispatcher.registry().subscribe(&first).unwrap();
    rx.wait_for(|job| job.stage == JobStage::Extracting).await.unwrap();

    let second = dispatcher.submit(request("tender"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dispatcher.status(&second).unwrap().stage, JobStage::Pending);

    assert!(dispatcher.cancel(&second));
    let job = dispatcher.wait(&second).await.unwrap();
    assert_eq!(job.error.unwrap().kind, ErrorKind::Cancelled);

    assert!(dispatcher.cancel(&first));
    let job = dispatcher.wait(&first).await.unwrap();
    assert_exactly_one_terminal(&job);
}

#[tokio::test]
async fn test_status_is_well_formed_while_running() {
    let dispatcher = dispatcher_with(Arc::new(HangingExtractor), secrets(), 4, None);
    let id = dispatcher.submit(request("tender"));

    let status = dispatcher.status(&id).unwrap();
    assert!(!status.stage.is_terminal());
    assert!(status.result.is_none());
    assert!(status.error.is_none());

    // 反复查询不会阻塞
    for _ in 0..1000 {
        assert!(dispatcher.status(&id).is_some());
    }
    dispatcher.cancel(&id);
}

#[tokio::test]
async fn test_unknown_job_id() {
    let dispatcher = dispatcher_with(Arc::new(FixedExtractor(fields())), secrets(), 4, None);
    let unknown = uuid::Uuid::new_v4();

    assert!(dispatcher.status(&unknown).is_none());
    assert!(!dispatcher.cancel(&unknown));
    assert!(dispatcher.wait(&unknown).await.is_none());
}

#[tokio::test]
async fn test_batch_run_writes_results_and_releases_finished_jobs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.pdf"), b"%PDF-1.4").unwrap();
    std::fs::write(dir.path().join("b.bmp"), b"BM").unwrap();
    let manifest_path = dir.path().join("batch.toml");
    std::fs::write(
        &manifest_path,
        r#"
        [[documents]]
        path = "a.pdf"
        doc_type_id = "tender"
        model_id = "gemini-pro"

        [[documents]]
        path = "b.bmp"
        doc_type_id = "broken"
        model_id = "gemini-pro"
        "#,
    )
    .unwrap();

    let config = Config {
        output_dir: dir.path().join("out"),
        status_poll_interval_ms: 10,
        ..Config::default()
    };
    let dispatcher = dispatcher_with(Arc::new(FixedExtractor(fields())), secrets(), 2, None);
    let app = App::with_dispatcher(config, dispatcher);

    let stats = app.run(&manifest_path).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);

    let written = std::fs::read_dir(dir.path().join("out")).unwrap().count();
    assert_eq!(written, 2);
    assert!(app.dispatcher().registry().is_empty());
}
