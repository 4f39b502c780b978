use anyhow::{bail, Result};
use std::path::PathBuf;

use doc_analyzer::utils::logging;
use doc_analyzer::{App, Config};

const USAGE: &str = "用法: doc_analyzer <manifest.toml> | --catalog";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    let Some(arg) = std::env::args().nth(1) else {
        bail!(USAGE);
    };

    if arg == "--catalog" {
        App::print_catalog(&config).await?;
        return Ok(());
    }
    if arg.starts_with('-') {
        bail!(USAGE);
    }

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    let stats = app.run(&PathBuf::from(arg)).await?;

    if stats.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
