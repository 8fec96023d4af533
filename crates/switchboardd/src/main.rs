//! switchboardd: signaling relay daemon for peer-to-peer connection setup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;

use switchboard_api::{load_server_config, page_router, signal_router, ApiState, Tls};
use switchboard_core::{DuplicatePeerPolicy, SwitchboardConfig};
use switchboard_hub::{Hub, HubOptions};

#[derive(Parser, Debug)]
#[clap(name = "switchboardd", version)]
struct Opt {
    /// Address for the landing page and status API
    #[clap(long = "addr")]
    addr: Option<SocketAddr>,
    /// Address for the WebSocket signaling endpoint
    #[clap(long = "wss-addr")]
    wss_addr: Option<SocketAddr>,
    /// TLS certificate chain in PEM format
    #[clap(long = "cert", requires = "key")]
    cert: Option<PathBuf>,
    /// TLS private key in PEM format
    #[clap(long = "key", requires = "cert")]
    key: Option<PathBuf>,
    /// Serve plain HTTP/WebSocket (local development only)
    #[clap(long = "insecure")]
    insecure: bool,
    /// Config file (defaults to $SWITCHBOARD_CONFIG or ~/.config/switchboard/config.toml)
    #[clap(long = "config")]
    config: Option<PathBuf>,
    /// What to do with a second connection for a connected peer id: replace or reject
    #[clap(long = "duplicate-peers")]
    duplicate_peers: Option<DuplicatePeerPolicy>,
    /// HTML page served at `/`
    #[clap(long = "index")]
    index: Option<PathBuf>,
}

impl Opt {
    /// Command-line flags win over file and environment.
    fn apply(&self, config: &mut SwitchboardConfig) {
        if let Some(addr) = self.addr {
            config.network.page_addr = addr;
        }
        if let Some(addr) = self.wss_addr {
            config.network.signal_addr = addr;
        }
        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            config.tls.cert_path = cert.clone();
            config.tls.key_path = key.clone();
        }
        if self.insecure {
            config.tls.enabled = false;
        }
        if let Some(policy) = self.duplicate_peers {
            config.relay.duplicate_peer_policy = policy;
        }
        if let Some(index) = &self.index {
            config.page.index_path = index.clone();
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(Opt::parse()).await {
        tracing::error!(error = %format!("{e:#}"), "switchboardd failed");
        std::process::exit(1);
    }
}

async fn run(opt: Opt) -> Result<()> {
    let mut config = match &opt.config {
        Some(path) => SwitchboardConfig::load_from(path),
        None => SwitchboardConfig::load(),
    }
    .context("failed to load config")?;
    opt.apply(&mut config);
    config.validate()?;

    // No partial availability: bad certificates or busy ports end the process.
    let tls = if config.tls.enabled {
        let server_config = load_server_config(&config.tls.cert_path, &config.tls.key_path)
            .context("failed to load TLS certificate pair")?;
        Some(Tls {
            config: server_config,
            handshake_timeout: Duration::from_secs(config.tls.handshake_timeout_secs),
        })
    } else {
        tracing::warn!("TLS disabled");
        None
    };

    let page_listener = TcpListener::bind(config.network.page_addr)
        .await
        .with_context(|| format!("failed to bind page endpoint {}", config.network.page_addr))?;
    let signal_listener = TcpListener::bind(config.network.signal_addr)
        .await
        .with_context(|| {
            format!("failed to bind signaling endpoint {}", config.network.signal_addr)
        })?;

    let hub = Hub::new(HubOptions::from(&config.relay));
    tracing::info!(
        duplicate_peers = ?config.relay.duplicate_peer_policy,
        send_queue_capacity = config.relay.send_queue_capacity,
        "switchboardd starting"
    );
    let state = ApiState::new(hub.clone(), config.page.index_path.clone());

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            hub.shutdown();
            shutdown_tx.send_replace(true);
        });
    }

    // ── Serve ────────────────────────────────────────────────────────────────
    let page = tokio::spawn(switchboard_api::serve(
        page_listener,
        tls.clone(),
        page_router(state.clone()),
        "page",
        stopped(shutdown_rx.clone()),
    ));
    let signal = tokio::spawn(switchboard_api::serve(
        signal_listener,
        tls,
        signal_router(state),
        "signal",
        stopped(shutdown_rx),
    ));

    let (page, signal) = tokio::join!(page, signal);
    page.context("page server panicked")??;
    signal.context("signaling server panicked")??;

    tracing::info!(peers = hub.registry().len(), "shut down");
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
