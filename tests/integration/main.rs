//! Switchboard integration test harness.
//!
//! Every test starts its own relay in-process on ephemeral loopback ports and
//! talks to it with real WebSocket and HTTP clients:
//!
//!   cargo test --test integration
//!
//! Relays are torn down when their `Relay` handle drops, so tests never share
//! listeners or registry state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use switchboard_api::{page_router, signal_router, ApiState, Tls};
use switchboard_core::Envelope;
use switchboard_hub::{Hub, HubOptions};

mod page;
mod tls;

/// How long any single client read may block before the test fails.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ── Relay ─────────────────────────────────────────────────────────────────────

/// A relay serving both endpoints on loopback.
pub struct Relay {
    pub hub: Hub,
    pub page_addr: SocketAddr,
    pub signal_addr: SocketAddr,
    stop: watch::Sender<bool>,
}

impl Relay {
    /// Plain-text relay with a throwaway landing page.
    pub async fn start(options: HubOptions) -> Result<Self> {
        Self::start_with(options, None, PathBuf::from("does-not-exist.html")).await
    }

    pub async fn start_with(options: HubOptions, tls: Option<Tls>, index_path: PathBuf) -> Result<Self> {
        let hub = Hub::new(options);
        let state = ApiState::new(hub.clone(), index_path);

        let page_listener = TcpListener::bind("127.0.0.1:0").await?;
        let signal_listener = TcpListener::bind("127.0.0.1:0").await?;
        let page_addr = page_listener.local_addr()?;
        let signal_addr = signal_listener.local_addr()?;

        let (stop, rx) = watch::channel(false);
        tokio::spawn(switchboard_api::serve(
            page_listener,
            tls.clone(),
            page_router(state.clone()),
            "page",
            stopped(rx.clone()),
        ));
        tokio::spawn(switchboard_api::serve(
            signal_listener,
            tls,
            signal_router(state),
            "signal",
            stopped(rx),
        ));

        Ok(Self {
            hub,
            page_addr,
            signal_addr,
            stop,
        })
    }

    pub fn ws_url(&self, peer_id: &str) -> String {
        format!("ws://{}/?peerId={peer_id}", self.signal_addr)
    }

    pub fn page_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.page_addr)
    }

    /// Connect a plain WebSocket client as `peer_id`.
    pub async fn join(&self, peer_id: &str) -> Result<Peer> {
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url(peer_id))
            .await
            .with_context(|| format!("{peer_id} failed to connect"))?;
        Ok(Peer { ws })
    }

    /// Poll until the registry holds exactly `count` peers.
    pub async fn wait_for_peers(&self, count: usize) -> Result<()> {
        wait_until(|| self.hub.registry().len() == count)
            .await
            .with_context(|| {
                format!(
                    "expected {count} peers, registry has {}",
                    self.hub.registry().len()
                )
            })
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.hub.shutdown();
        self.stop.send_replace(true);
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Poll `cond` every 10ms for up to `RECV_TIMEOUT`.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not reached in {RECV_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

// ── Peer ──────────────────────────────────────────────────────────────────────

/// A WebSocket client connected to the signaling endpoint.
pub struct Peer<S = MaybeTlsStream<TcpStream>> {
    ws: WebSocketStream<S>,
}

impl<S> Peer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.ws.send(Message::Binary(data.to_vec().into())).await?;
        Ok(())
    }

    /// Next text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> Result<String> {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a frame")?
                .context("connection ended")??;
            match msg {
                Message::Text(text) => return Ok(text.as_str().to_owned()),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                other => bail!("expected a text frame, got {other:?}"),
            }
        }
    }

    pub async fn recv_envelope(&mut self) -> Result<Envelope> {
        let text = self.recv_text().await?;
        Envelope::from_json(text.as_bytes()).with_context(|| format!("not an envelope: {text}"))
    }

    /// Assert nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(frame) => bail!("expected silence, got {frame:?}"),
        }
    }

    /// Wait for the relay to close this connection. Returns the text frames
    /// that were still in flight ahead of the close.
    pub async fn expect_closed(&mut self) -> Result<Vec<String>> {
        let mut in_flight = Vec::new();
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("connection still open")?;
            match next {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return Ok(in_flight),
                Some(Ok(Message::Text(text))) => in_flight.push(text.as_str().to_owned()),
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
