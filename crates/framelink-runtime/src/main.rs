//! framelink demo
//!
//! Runs host page and plugin frame in one process:
//! - host window + document, plugin loaded in-process into each frame
//! - Panel -> Iframer -> handshake -> `params` request -> ack
//! - Tracing span per channel

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use framelink_core::error::Result;
use framelink_runtime::dom::MemoryDocument;
use framelink_runtime::panel::{HostRuntime, Panel};
use framelink_runtime::plugin::InProcessPlugin;
use framelink_runtime::transport::MemoryWindow;
use framelink_runtime::ui::UI;
use framelink_runtime::{config, plugin};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "framelink.yaml".to_string());
    if let Err(e) = run(&path).await {
        tracing::error!(error = %e, code = e.code().as_str(), "framelink demo failed");
        std::process::exit(1);
    }
}

async fn run(path: &str) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let channel_cfg = (&cfg.channel).into();

    let host = MemoryWindow::new(&cfg.host.url)?;
    let mut loader = InProcessPlugin::new(channel_cfg).with_title("Organizations (ready)");
    let mut delivered = loader.subscribe();
    let document = MemoryDocument::with_loader(host.clone(), Arc::new(loader));

    let runtime = HostRuntime::attach(cfg, host.handle())?;
    runtime.bus().subscribe(UI, plugin::SET_TITLE, |title| {
        tracing::info!(%title, "page title");
    });

    let panel = Panel::new(runtime.clone());
    panel.attach(document.body().handle())?;

    tracing::info!(origin = %runtime.router().origin(), "framelink demo starting");
    let ack = panel.start().await?;
    tracing::info!(%ack, "plugin acknowledged");

    let wait = runtime.channel_config().request_timeout;
    if let Ok(Some(params)) = tokio::time::timeout(wait, delivered.recv()).await {
        tracing::info!(
            frame_id = %params.frame_id,
            groups = %params.params.groups_service_url,
            user_profile = %params.params.user_profile_service_url,
            workspace = %params.params.workspace_service_url,
            "plugin received params"
        );
    }

    panel.stop();
    let stats = runtime.router().stats();
    tracing::info!(stats = %stats.render("host"), "framelink demo done");
    Ok(())
}
