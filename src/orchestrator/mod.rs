//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和状态管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `job_registry` - 状态查询门面
//! - 登记任务、持有每个任务的最新记录
//! - `status(id)` 只读、幂等，不等待执行方
//! - `JobHandle` 是唯一能修改任务记录的入口，负责状态机检查
//!
//! ### `dispatcher` - 任务调度器
//! - `submit` 立即返回任务 ID，任务在后台执行
//! - Semaphore 控制并发数量
//! - 取消与超时统一转为 `Cancelled` 失败
//!
//! ### `batch_processor` - 批量处理
//! - 读取清单、提交任务、轮询状态、写出结果
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理一批文档)
//!     ↓
//! dispatcher + job_registry (处理单个任务的生命周期)
//!     ↓
//! workflow::AnalysisFlow (提取 → 渲染 → 生成)
//!     ↓
//! clients / services (能力层：提取协议 / 生成 / 扁平化 / 渲染)
//!     ↓
//! infrastructure (基础设施：HTTP / 密钥 / 模板 / 取消信号)
//! ```

pub mod batch_processor;
pub mod dispatcher;
pub mod job_registry;

// 重新导出主要类型
pub use batch_processor::{App, ProcessingStats};
pub use dispatcher::JobDispatcher;
pub use job_registry::{JobHandle, JobRegistry};
