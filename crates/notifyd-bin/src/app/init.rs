//! Daemon startup and wiring.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use channel_gateway::{GatewayClient, GatewayConfig};
use channel_session::{
    ChannelManager, ChannelTransport, CredentialStore, FileCredentialStore, SessionConfig,
};
use invoice_delivery::{
    ArtifactArchive, DeliveryConfig, DeliveryMonitor, DeliveryService, FsArchive, InvoiceRenderer,
    MonitorConfig, OrderStore,
};
use notifyd_core::{Config, Paths};
use tracing::{info, warn};

use crate::app::clients::{HttpInvoiceRenderer, HttpOrderStore};
use crate::app::AppState;
use crate::control::{ControlClient, ControlServer, Method};

/// Timeout for one internal-API HTTP request (order fetch, invoice render).
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the daemon until shutdown is requested.
pub async fn run_daemon(config: Config, paths: Paths) -> anyhow::Result<()> {
    // Singleton enforcement: refuse to start while a live daemon still
    // answers on the socket.
    let socket_path = paths.socket_file();
    if socket_path.exists() {
        let client = ControlClient::new(socket_path.clone());
        if client.call_method(Method::Health).await.is_ok() {
            anyhow::bail!(
                "daemon is already running on {} (use `tavola-notifyd stop` first)",
                socket_path.display()
            );
        }
        warn!(path = %socket_path.display(), "removing stale control socket");
        let _ = std::fs::remove_file(&socket_path);
    }

    let pid_file = paths.pid_file();
    if pid_file.exists() {
        let _ = std::fs::remove_file(&pid_file);
    }

    info!("starting tavola-notifyd");

    let admin_address = config.require_admin_address()?.to_string();
    info!(
        app_base_url = %config.app_base_url,
        gateway_url = %config.gateway_url,
        admin_address = %admin_address,
        "configuration loaded"
    );

    paths
        .ensure_dirs()
        .context("failed to create runtime directories")?;

    let pid = std::process::id();
    std::fs::write(&pid_file, pid.to_string()).context("failed to write pid file")?;
    info!(pid = pid, "daemon started");

    // Channel session, reached through the gateway sidecar.
    let gateway_url = config.gateway_url().context("invalid gateway URL")?;
    let transport: Arc<dyn ChannelTransport> =
        Arc::new(GatewayClient::new(GatewayConfig::new(gateway_url)));
    let credentials: Arc<dyn CredentialStore> = Arc::new(
        FileCredentialStore::new(paths.channel_credentials_file())
            .context("failed to open channel credential store")?,
    );
    let channel = Arc::new(ChannelManager::new(
        transport,
        credentials,
        SessionConfig::default(),
    ));

    // Internal HTTP API adapters for order data and invoice rendering.
    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let orders: Arc<dyn OrderStore> = Arc::new(HttpOrderStore::new(
        http.clone(),
        &config.app_base_url,
        config.app_api_token.clone(),
    ));
    let renderer: Arc<dyn InvoiceRenderer> = Arc::new(HttpInvoiceRenderer::new(
        http,
        &config.app_base_url,
        config.app_api_token.clone(),
    ));
    let archive: Arc<dyn ArtifactArchive> = Arc::new(
        FsArchive::new(paths.invoices_dir()).context("failed to prepare invoice archive")?,
    );

    let delivery = Arc::new(DeliveryService::new(
        Arc::clone(&channel),
        orders,
        renderer,
        Some(archive),
        admin_address,
        DeliveryConfig::default(),
    ));

    let monitor_task = Arc::new(DeliveryMonitor::new(
        Arc::clone(&delivery),
        Arc::clone(&channel),
        MonitorConfig::default(),
    ))
    .spawn();

    // Bring the channel session up in the background; delivery passes wait
    // on readiness themselves.
    channel.initialize().await;

    let state = AppState {
        channel: Arc::clone(&channel),
        delivery,
    };
    let server = ControlServer::new(socket_path.clone(), state);

    // An interrupt stops the server the same way the shutdown method does.
    {
        let shutdown = server.shutdown_sender();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                let _ = shutdown.send(());
            }
        });
    }

    let server_result = server.run().await;

    monitor_task.abort();
    channel.shutdown().await;
    let _ = std::fs::remove_file(&pid_file);
    let _ = std::fs::remove_file(&socket_path);

    info!("daemon stopped");

    server_result
}
