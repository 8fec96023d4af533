use crate::*;

fn scratch_index(name: &str, body: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("switchboard-page-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("index.html");
    std::fs::write(&path, body)?;
    Ok(path)
}

#[tokio::test]
async fn root_serves_the_landing_page() -> Result<()> {
    let body = "<!doctype html><title>switchboard</title>";
    let index = scratch_index("root", body)?;
    let relay = Relay::start_with(HubOptions::default(), None, index.clone()).await?;

    let resp = reqwest::get(relay.page_url("/")).await?;
    assert_eq!(resp.status().as_u16(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"), "{content_type}");
    assert_eq!(resp.text().await?, body);

    let _ = std::fs::remove_dir_all(index.parent().unwrap());
    Ok(())
}

#[tokio::test]
async fn unreadable_page_is_a_server_error() -> Result<()> {
    let relay = Relay::start(HubOptions::default()).await?;
    let resp = reqwest::get(relay.page_url("/")).await?;
    assert_eq!(resp.status().as_u16(), 500);
    Ok(())
}

#[tokio::test]
async fn other_paths_and_methods_are_refused() -> Result<()> {
    let index = scratch_index("refused", "<p>hi</p>")?;
    let relay = Relay::start_with(HubOptions::default(), None, index.clone()).await?;

    let resp = reqwest::get(relay.page_url("/index.html")).await?;
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(resp.text().await?, "Not found");

    let resp = reqwest::Client::new().post(relay.page_url("/")).send().await?;
    assert_eq!(resp.status().as_u16(), 405);

    let _ = std::fs::remove_dir_all(index.parent().unwrap());
    Ok(())
}

#[tokio::test]
async fn status_lists_connected_peers() -> Result<()> {
    let relay = Relay::start(HubOptions::default()).await?;

    let empty: serde_json::Value = reqwest::get(relay.page_url("/api/peers")).await?.json().await?;
    assert_eq!(empty, serde_json::json!({ "peers": [], "count": 0 }));

    let _bob = relay.join("bob").await?;
    let _alice = relay.join("alice").await?;
    relay.wait_for_peers(2).await?;

    let status: serde_json::Value = reqwest::get(relay.page_url("/api/peers")).await?.json().await?;
    assert_eq!(status["count"], 2);
    let ids: Vec<&str> = status["peers"]
        .as_array()
        .context("peers is not an array")?
        .iter()
        .filter_map(|p| p["peer_id"].as_str())
        .collect();
    assert_eq!(ids, ["alice", "bob"]);
    assert!(status["peers"][0]["connected_secs"].is_u64());
    Ok(())
}

#[tokio::test]
async fn signaling_port_does_not_serve_the_page() -> Result<()> {
    let index = scratch_index("split", "<p>hi</p>")?;
    let relay = Relay::start_with(HubOptions::default(), None, index.clone()).await?;

    // A plain GET without upgrade headers is not a WebSocket handshake.
    let resp = reqwest::get(format!("http://{}/?peerId=alice", relay.signal_addr)).await?;
    assert!(resp.status().is_client_error(), "{}", resp.status());
    assert!(relay.hub.registry().is_empty());

    let _ = std::fs::remove_dir_all(index.parent().unwrap());
    Ok(())
}
