use anyhow::{Context, Result};
use feishu_tapd_relay::config::Config;
use feishu_tapd_relay::forwarder::{Forwarder, ForwarderSettings};
use feishu_tapd_relay::server::{AppState, build_router};
use feishu_tapd_relay::tapd::TapdClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let config = Config::from_env().context("load relay config")?;
    let mappings = config.load_mappings().context("load field mappings")?;
    let client = TapdClient::from_config(&config).context("initialize tapd client")?;
    let forwarder = Forwarder::new(
        Arc::new(client),
        Arc::new(mappings),
        ForwarderSettings::from_config(&config),
    );

    if config.tapd_workspace_id.is_none() {
        info!("TAPD_WORKSPACE_ID not set; callbacks must carry workspace_id");
    }

    let state = Arc::new(AppState { config, forwarder });
    let app = build_router(state.clone()).context("build router")?;

    let listener = TcpListener::bind(&state.config.bind_addr)
        .await
        .with_context(|| format!("bind {}", state.config.bind_addr))?;

    info!(
        bind = %state.config.bind_addr,
        webhook_path = %state.config.webhook_path,
        signature_verification = state.config.feishu_verification_token.is_some(),
        "feishu tapd relay listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("serve feishu tapd relay")?;

    Ok(())
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
