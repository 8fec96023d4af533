use crate::*;

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::TlsConnector;

/// Self-signed `localhost` certificate written to a scratch dir, loaded the
/// same way the daemon loads its pair.
fn self_signed(name: &str) -> Result<(Tls, CertificateDer<'static>, PathBuf)> {
    let dir = std::env::temp_dir().join(format!("switchboard-wss-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert_path = dir.join("server.crt");
    let key_path = dir.join("server.key");
    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    let tls = Tls {
        config: switchboard_api::load_server_config(&cert_path, &key_path)?,
        handshake_timeout: Duration::from_secs(2),
    };
    Ok((tls, cert.der().clone(), dir))
}

fn connector(root: CertificateDer<'static>) -> Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(root)?;
    let config =
        rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn join_wss(
    relay: &Relay,
    connector: &TlsConnector,
    peer_id: &str,
) -> Result<Peer<tokio_rustls::client::TlsStream<TcpStream>>> {
    let tcp = TcpStream::connect(relay.signal_addr).await?;
    let tls = connector
        .connect(ServerName::try_from("localhost")?, tcp)
        .await
        .context("TLS handshake failed")?;
    let url = format!("wss://localhost:{}/?peerId={peer_id}", relay.signal_addr.port());
    let (ws, _) = tokio_tungstenite::client_async(url, tls).await?;
    Ok(Peer::new(ws))
}

#[tokio::test]
async fn signaling_over_tls() -> Result<()> {
    let (tls, root, dir) = self_signed("signal")?;
    let relay = Relay::start_with(HubOptions::default(), Some(tls), dir.join("index.html")).await?;
    let connector = connector(root)?;

    let mut alice = join_wss(&relay, &connector, "alice").await?;
    assert_eq!(alice.recv_envelope().await?, Envelope::current_peers(vec![]));
    assert_eq!(alice.recv_envelope().await?, Envelope::peer_join("alice"));

    let mut bob = join_wss(&relay, &connector, "bob").await?;
    bob.recv_envelope().await?;
    bob.recv_envelope().await?;
    assert_eq!(alice.recv_envelope().await?, Envelope::peer_join("bob"));

    let raw = r#"{"messageId":"PROXY","toPeerId":"alice","messageData":{"type":"offer"}}"#;
    bob.send_text(raw).await?;
    assert_eq!(alice.recv_text().await?, raw);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[tokio::test]
async fn stalled_handshake_does_not_block_others() -> Result<()> {
    let (tls, root, dir) = self_signed("stall")?;
    let relay = Relay::start_with(HubOptions::default(), Some(tls), dir.join("index.html")).await?;
    let connector = connector(root)?;

    // Opens TCP and never speaks TLS.
    let _idle = TcpStream::connect(relay.signal_addr).await?;

    let mut alice = join_wss(&relay, &connector, "alice").await?;
    assert_eq!(alice.recv_envelope().await?, Envelope::current_peers(vec![]));

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[tokio::test]
async fn plaintext_client_is_refused_by_tls_listener() -> Result<()> {
    let (tls, _root, dir) = self_signed("plain")?;
    let relay = Relay::start_with(HubOptions::default(), Some(tls), dir.join("index.html")).await?;

    assert!(tokio_tungstenite::connect_async(relay.ws_url("alice")).await.is_err());
    assert!(relay.hub.registry().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
