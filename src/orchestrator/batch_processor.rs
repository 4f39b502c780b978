//! 批量文档分析 - 编排层
//!
//! ## 职责
//!
//! 命令行入口使用的应用结构，负责一批文档的提交与结果收集。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：加载目录、创建分析流程和调度器
//! 2. **批量提交**：读取 TOML 清单，逐个提交分析任务
//! 3. **状态轮询**：通过状态查询门面跟踪每个任务，直到全部结束
//! 4. **结果落盘**：每个任务的最终记录写为 `{output_dir}/{job_id}.json`
//! 5. **全局统计**：汇总成功与失败数量

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{AppConfig, Config};
use crate::error::{AppError, AppResult};
use crate::models::{load_manifest, load_request, JobId, JobStage};
use crate::orchestrator::dispatcher::JobDispatcher;
use crate::utils::logging::{log_jobs_submitted, log_startup, print_final_stats};
use crate::workflow::AnalysisFlow;

/// 应用主结构
pub struct App {
    config: Config,
    dispatcher: JobDispatcher,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(config.max_concurrent_jobs, config.job_timeout_secs);

        info!("📁 正在加载配置目录: {}", config.catalog_path.display());
        let app_config = AppConfig::load(&config.catalog_path).await?;
        info!(
            "✓ 共 {} 种文档类型，{} 个模型",
            app_config.document_types.len(),
            app_config.ai_models.len()
        );

        let flow = AnalysisFlow::from_config(app_config, &config)?;
        let dispatcher = JobDispatcher::new(
            Arc::new(flow),
            config.max_concurrent_jobs,
            Some(config.job_timeout()),
        );

        Ok(Self { config, dispatcher })
    }

    /// 使用已构造好的调度器创建应用
    pub fn with_dispatcher(config: Config, dispatcher: JobDispatcher) -> Self {
        Self { config, dispatcher }
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// 打印对外公开的目录
    pub async fn print_catalog(config: &Config) -> AppResult<()> {
        let app_config = AppConfig::load(&config.catalog_path).await?;
        let catalog = serde_json::to_string_pretty(&app_config.catalog())?;
        println!("{}", catalog);
        Ok(())
    }

    /// 运行应用主逻辑
    pub async fn run(&self, manifest_path: &Path) -> AppResult<ProcessingStats> {
        info!("\n📁 正在读取清单: {}", manifest_path.display());
        let manifest = load_manifest(manifest_path).await?;

        if manifest.documents.is_empty() {
            warn!("⚠️ 清单中没有待分析的文档，程序结束");
            return Ok(ProcessingStats::default());
        }

        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let mut stats = ProcessingStats {
            total: manifest.documents.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for entry in &manifest.documents {
            match load_request(entry, base_dir).await {
                Ok(request) => pending.push(self.dispatcher.submit(request)),
                Err(e) => {
                    error!("❌ 无法读取 {}: {}", entry.path.display(), e);
                    stats.failed += 1;
                }
            }
        }
        log_jobs_submitted(pending.len());

        fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| AppError::io(self.config.output_dir.display().to_string(), e))?;

        self.collect_results(pending, &mut stats).await?;

        print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            &self.config.output_dir.display().to_string(),
        );

        Ok(stats)
    }

    /// 轮询状态门面，直到所有任务结束
    async fn collect_results(
        &self,
        mut pending: Vec<JobId>,
        stats: &mut ProcessingStats,
    ) -> AppResult<()> {
        let mut last_stage: HashMap<JobId, JobStage> = HashMap::new();

        while !pending.is_empty() {
            let mut still_running = Vec::with_capacity(pending.len());

            for id in pending {
                let Some(status) = self.dispatcher.status(&id) else {
                    warn!("⚠️ 任务 {} 不存在", id);
                    stats.failed += 1;
                    continue;
                };

                if last_stage.insert(id, status.stage) != Some(status.stage) {
                    info!("任务 {} 进入 {}", id, status.stage.as_str());
                }

                if !status.stage.is_terminal() {
                    still_running.push(id);
                    continue;
                }

                match status.stage {
                    JobStage::Succeeded => stats.success += 1,
                    _ => stats.failed += 1,
                }
                self.write_result(&id).await?;
                self.dispatcher.registry().remove(&id);
            }

            pending = still_running;
            if !pending.is_empty() {
                sleep(self.config.status_poll_interval()).await;
            }
        }

        Ok(())
    }

    async fn write_result(&self, id: &JobId) -> AppResult<PathBuf> {
        let path = self.config.output_dir.join(format!("{}.json", id));
        let Some(job) = self.dispatcher.registry().snapshot(id) else {
            return Err(AppError::Internal(format!("任务 {} 不存在", id)));
        };

        let content = serde_json::to_string_pretty(&job)?;
        fs::write(&path, content)
            .await
            .map_err(|e| AppError::io(path.display().to_string(), e))?;

        Ok(path)
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}
