//! 密钥解析 - 基础设施层
//!
//! 凭据在每个任务执行时按需读取，不跨任务缓存，以便密钥轮换后立即生效。

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::SecretError;
use crate::infrastructure::http::HttpTransport;

/// 密钥解析能力
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// 读取 `mount_point` 下 `path` 中的 `key`，不存在时返回 `Ok(None)`
    async fn get_secret(
        &self,
        path: &str,
        key: &str,
        mount_point: &str,
    ) -> Result<Option<String>, SecretError>;
}

/// 读取必需的密钥，缺失视为错误
pub async fn require_secret(
    resolver: &dyn SecretResolver,
    path: &str,
    key: &str,
    mount_point: &str,
) -> Result<String, SecretError> {
    resolver
        .get_secret(path, key, mount_point)
        .await?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SecretError::Missing {
            path: path.to_string(),
            key: key.to_string(),
            mount_point: mount_point.to_string(),
        })
}

/// HashiCorp Vault KV v2 密钥解析
pub struct VaultSecretResolver {
    transport: HttpTransport,
    addr: String,
    token: String,
}

impl VaultSecretResolver {
    pub fn new(
        transport: HttpTransport,
        addr: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            addr: addr.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SecretResolver for VaultSecretResolver {
    async fn get_secret(
        &self,
        path: &str,
        key: &str,
        mount_point: &str,
    ) -> Result<Option<String>, SecretError> {
        let url = format!("{}/v1/{}/data/{}", self.addr, mount_point, path);
        debug!("读取密钥 {}/{} 中的 {}", mount_point, path, key);

        let store_error = |source| SecretError::Store {
            path: path.to_string(),
            mount_point: mount_point.to_string(),
            source,
        };

        let response = self
            .transport
            .get(&url, &[("X-Vault-Token", self.token.as_str())])
            .await
            .map_err(store_error)?;

        if response.status == 404 {
            return Ok(None);
        }

        let body: Value = response
            .error_for_status()
            .and_then(|r| r.json())
            .map_err(store_error)?;

        Ok(body
            .pointer("/data/data")
            .and_then(|data| data.get(key))
            .and_then(Value::as_str)
            .map(str::to_owned))
    }
}

/// 内存中的密钥表，用于测试和本地运行
#[derive(Debug, Default, Clone)]
pub struct StaticSecretResolver {
    secrets: HashMap<(String, String, String), String>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(
        mut self,
        mount_point: &str,
        path: &str,
        key: &str,
        value: impl Into<String>,
    ) -> Self {
        self.secrets.insert(
            (mount_point.to_string(), path.to_string(), key.to_string()),
            value.into(),
        );
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn get_secret(
        &self,
        path: &str,
        key: &str,
        mount_point: &str,
    ) -> Result<Option<String>, SecretError> {
        Ok(self
            .secrets
            .get(&(mount_point.to_string(), path.to_string(), key.to_string()))
            .cloned())
    }
}
