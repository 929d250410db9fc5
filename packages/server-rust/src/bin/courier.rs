//! `courier`: monitors a folder and dumps every file through a console route.

use anyhow::Context as _;
use clap::Parser;
use courier_core::Context;
use courier_server::{logging, ConsoleStep, ServerConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    logging::init(&config.logging())?;

    let ctx = Context::builder()
        .config(config.context_config())
        .build()?;

    let route = ctx
        .route::<String>("folder-to-console")
        .to(ConsoleStep::stdout())
        .freeze();
    let monitor = config.folder_monitor().build(&ctx, route)?;
    ctx.register_recurring("folder-monitor", config.poll_interval(), monitor);

    info!(
        folder = %config.folder.display(),
        pattern = %config.pattern,
        poll_interval_ms = config.poll_interval_ms,
        "courier running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");

    let report = ctx.shutdown().await;
    if !report.is_clean() {
        warn!(
            failed = ?report.failed,
            timed_out = ?report.timed_out,
            "some registered tasks did not stop cleanly"
        );
    }
    Ok(())
}
