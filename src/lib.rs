//! # Doc Analyzer
//!
//! 文档分析编排：OCR / 结构化提取 → 提示词渲染 → 大模型生成 JSON，
//! 整个流程作为可查询状态、可取消的异步任务执行。
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `HttpTransport` - 统一的 TLS 校验与超时策略
//! - `SecretResolver` - 按需读取凭据（Vault / 内存）
//! - `TemplateSource` - 加载提示词模板
//! - `CancelSignal` - 任务级取消信号
//!
//! ### ② 客户端与业务能力层（Clients / Services）
//! - `clients/` - 第三方协议：提取服务事务协议、两种风格的生成服务
//! - `services/` - 单一能力：提取结果扁平化、提示词渲染
//!
//! ### ③ 流程层（Workflow）
//! - `AnalysisCtx` - 上下文封装（任务 ID + 文件名）
//! - `AnalysisFlow` - 流程编排（提取 → 渲染 → 生成）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_registry` - 状态查询门面
//! - `orchestrator/dispatcher` - 任务调度、并发与取消
//! - `orchestrator/batch_processor` - 批量清单处理
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{AppConfig, Config};
pub use error::{AppError, AppResult, ErrorKind, JobError};
pub use models::{AnalysisJob, AnalysisRequest, DocumentUpload, JobId, JobStage, JobStatus};
pub use orchestrator::{App, JobDispatcher, JobRegistry};
pub use workflow::{AnalysisCtx, AnalysisFlow};
