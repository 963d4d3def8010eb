//! PhotoDrop Daemon
//!
//! 后台运行上传服务器：
//! - 监听局域网端口，提供手机端上传页面
//! - 按设备类型保存照片
//! - 定期清理空闲的上传会话

mod args;

use anyhow::Result;
use args::Cli;
use clap::Parser;
use photodrop_core::UploadServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 桥接 log crate（photodrop-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,photodrop_core=debug")),
        )
        .try_init();

    tracing::info!("PhotoDrop Daemon starting...");

    let settings = cli.settings();
    if cli.save_config {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(photodrop_core::Settings::config_path);
        settings.save_to(&path)?;
        tracing::info!("Saved settings to {:?}", path);
    }

    let server = UploadServer::new(settings)?;
    tracing::info!("Open {} on your phone", server.context().address);
    tracing::info!("Gallery at {}desktop", server.context().address);

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutting down...");
        })
        .await?;

    Ok(())
}
