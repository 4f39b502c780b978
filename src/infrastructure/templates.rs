//! 提示词模板来源 - 基础设施层

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::error::ConfigError;

/// 按引用名加载提示词模板
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn load(&self, template_ref: &str) -> Result<String, ConfigError>;
}

/// 从目录读取模板文件
pub struct FileTemplateSource {
    base_dir: PathBuf,
}

impl FileTemplateSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    async fn load(&self, template_ref: &str) -> Result<String, ConfigError> {
        let path = self.base_dir.join(template_ref);
        debug!("加载提示词模板: {}", path.display());

        fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::TemplateNotFound {
                reference: template_ref.to_string(),
                source,
            })
    }
}

/// 内存中的模板表
#[derive(Debug, Default, Clone)]
pub struct InMemoryTemplateSource {
    templates: HashMap<String, String>,
}

impl InMemoryTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template_ref: &str, content: impl Into<String>) -> Self {
        self.templates
            .insert(template_ref.to_string(), content.into());
        self
    }
}

#[async_trait]
impl TemplateSource for InMemoryTemplateSource {
    async fn load(&self, template_ref: &str) -> Result<String, ConfigError> {
        self.templates
            .get(template_ref)
            .cloned()
            .ok_or_else(|| ConfigError::TemplateNotFound {
                reference: template_ref.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "模板未注册"),
            })
    }
}
