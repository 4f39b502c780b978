//! 基础设施层
//!
//! 持有稀缺资源（HTTP 客户端、密钥库连接、模板目录），只暴露能力。

pub mod cancel;
pub mod http;
pub mod secrets;
pub mod templates;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use http::{FilePart, HttpResponse, HttpSettings, HttpTransport};
pub use secrets::{require_secret, SecretResolver, StaticSecretResolver, VaultSecretResolver};
pub use templates::{FileTemplateSource, InMemoryTemplateSource, TemplateSource};
