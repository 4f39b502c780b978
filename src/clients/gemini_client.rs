/// 直接生成风格的生成客户端
///
/// 使用 `generateContent` 请求格式，响应嵌套在 `candidates[0].content.parts[0]` 中，
/// 可能是结构化的 `functionCall.args`，也可能是需要再解析的 `text`。
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::clients::generation::{parse_json_text, GenerationClient, GenerationCredentials};
use crate::config::{GeminiEndpoints, GenerationProvider};
use crate::error::{GenerationError, HttpError};
use crate::infrastructure::{HttpSettings, HttpTransport};

const MODEL_PLACEHOLDER: &str = "{model_name}";

/// 直接生成客户端
pub struct DirectGenerationGenerator {
    transport: HttpTransport,
    url: String,
    model_name: String,
    credentials: GenerationCredentials,
}

impl DirectGenerationGenerator {
    pub fn new(
        model_name: impl Into<String>,
        credentials: GenerationCredentials,
        endpoints: GeminiEndpoints,
        http: HttpSettings,
    ) -> Result<Self, HttpError> {
        let model_name = model_name.into();
        let transport = HttpTransport::new(HttpSettings {
            tls_verify: endpoints.tls_verify,
            ..http
        })?;
        let url = format!(
            "{}{}",
            endpoints.base_url,
            endpoints
                .generate_content_path
                .replace(MODEL_PLACEHOLDER, &model_name)
        );

        Ok(Self {
            transport,
            url,
            model_name,
            credentials,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GenerationClient for DirectGenerationGenerator {
    fn provider(&self) -> GenerationProvider {
        GenerationProvider::Google
    }

    async fn generate(&self, prompt: &str) -> Result<Value, GenerationError> {
        debug!("调用直接生成 API，模型: {}", self.model_name);

        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "response_mime_type": "application/json" }
        });

        let response = self
            .transport
            .post_json(
                &self.url,
                &[("X-goog-api-key", self.credentials.api_key.as_str())],
                &payload,
            )
            .await
            .and_then(|r| r.success_json::<Value>())
            .map_err(GenerationError::Upstream)?;

        parse_direct_response(&response)
    }
}

/// 解析 `generateContent` 响应
///
/// 没有任何候选结果视为被内容安全策略拦截，原因取自 `promptFeedback.blockReason`。
pub fn parse_direct_response(response: &Value) -> Result<Value, GenerationError> {
    let candidate = match response.get("candidates").and_then(Value::as_array) {
        Some(candidates) if !candidates.is_empty() => &candidates[0],
        _ => {
            let reason = response
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            warn!("⚠️ 生成请求被拦截，原因: {}", reason);
            return Err(GenerationError::Blocked { reason });
        }
    };

    let part = candidate
        .pointer("/content/parts/0")
        .ok_or_else(|| GenerationError::UnexpectedFormat("候选结果中没有 parts".to_string()))?;

    if let Some(args) = part.pointer("/functionCall/args") {
        return Ok(args.clone());
    }

    match part.get("text") {
        Some(Value::String(text)) => parse_json_text(text),
        _ => Err(GenerationError::UnexpectedFormat(
            "parts[0] 既没有 functionCall 也没有 text".to_string(),
        )),
    }
}
