//! HTTP 传输 - 基础设施层
//!
//! 所有出站请求都走这里，保证 TLS 校验和超时策略一致。

use reqwest::{multipart, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::HttpError;

/// HTTP 传输配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    /// 是否校验服务端证书
    pub tls_verify: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            tls_verify: true,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// 上传的文件
#[derive(Debug, Clone)]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

/// HTTP 响应（状态码 + 已读取的响应体）
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 非 2xx 时转为 [`HttpError::Status`]，保留响应体用于诊断
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                url: self.url,
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_str(&self.body).map_err(|source| HttpError::Decode {
            url: self.url.clone(),
            source,
            body: self.body.clone(),
        })
    }

    /// 2xx 检查 + JSON 解码
    pub fn success_json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        self.error_for_status()?.json()
    }
}

/// HTTP 传输
///
/// 职责：
/// - 持有 reqwest 客户端
/// - 只暴露 GET / POST 能力
/// - 不认识任何业务协议
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// 创建新的传输实例
    pub fn new(settings: HttpSettings) -> Result<Self, HttpError> {
        if !settings.tls_verify {
            warn!("⚠️ 已显式关闭 TLS 证书校验，仅应在开发环境使用");
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(!settings.tls_verify)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(HttpError::Build)?;

        Ok(Self { client })
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpError> {
        let builder = with_headers(self.client.get(url), headers);
        self.send(url, builder).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<HttpResponse, HttpError> {
        let builder = with_headers(self.client.post(url), headers).json(body);
        self.send(url, builder).await
    }

    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &T,
    ) -> Result<HttpResponse, HttpError> {
        let builder = with_headers(self.client.post(url), headers).form(form);
        self.send(url, builder).await
    }

    pub async fn post_multipart(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        file: FilePart<'_>,
    ) -> Result<HttpResponse, HttpError> {
        let part = multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.to_string())
            .mime_str(file.content_type)
            .map_err(|source| HttpError::Transport {
                url: url.to_string(),
                source,
            })?;
        let form = multipart::Form::new().part(file.field.to_string(), part);

        let builder = with_headers(self.client.post(url), headers).multipart(form);
        self.send(url, builder).await
    }

    async fn send(&self, url: &str, builder: RequestBuilder) -> Result<HttpResponse, HttpError> {
        let response = builder.send().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })?;

        debug!("HTTP {} <- {} ({} 字节)", status, url, body.len());

        Ok(HttpResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}

fn with_headers(builder: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    headers
        .iter()
        .fold(builder, |builder, (name, value)| builder.header(*name, *value))
}
