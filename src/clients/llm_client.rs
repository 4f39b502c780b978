/// 对话补全风格的生成客户端
///
/// 通过 `async-openai` 调用兼容 OpenAI API 的服务：
/// 提示词作为单条用户消息发送，要求以 JSON 对象格式返回，
/// 返回的消息内容本身是 JSON 字符串，需要再解析一次。
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::generation::{parse_json_text, GenerationClient, GenerationCredentials};
use crate::config::GenerationProvider;
use crate::error::GenerationError;
use crate::utils::truncate_text;

/// 对话补全客户端
pub struct ChatCompletionGenerator {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl ChatCompletionGenerator {
    /// 创建新的客户端，`api_base` 为空时使用 SDK 默认地址
    pub fn new(
        model_name: impl Into<String>,
        credentials: GenerationCredentials,
        api_base: Option<&str>,
    ) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(credentials.api_key);
        if let Some(base) = api_base {
            openai_config = openai_config.with_api_base(base);
        }

        Self {
            client: Client::with_config(openai_config),
            model_name: model_name.into(),
        }
    }

    fn provider_error(&self, message: impl Into<String>) -> GenerationError {
        GenerationError::Provider {
            model: self.model_name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionGenerator {
    fn provider(&self) -> GenerationProvider {
        GenerationProvider::OpenAi
    }

    async fn generate(&self, prompt: &str) -> Result<Value, GenerationError> {
        debug!("调用对话补全 API，模型: {}", self.model_name);
        debug!("提示词长度: {} 字符", prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| self.provider_error(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| self.provider_error(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("对话补全 API 调用失败: {}", e);
            self.provider_error(e.to_string())
        })?;

        let content = response
            .choices
            .first()
            .ok_or_else(|| GenerationError::UnexpectedFormat("响应中没有 choices".to_string()))?
            .message
            .content
            .clone()
            .unwrap_or_default();

        debug!("对话补全返回: {}", truncate_text(&content, 200));

        parse_json_text(&content)
    }
}
