use std::env::var;
use clickro::{Client, ClientConfig, Result};

pub async fn main() -> Result<()> {
    let client = Client::from_env()?;
    client.ping().await?;
    client.query("SELECT 1").await?;

    if let Ok(url) = var("CLICKHOUSE_URL") {
        let client = Client::connect(&url)?;
        client.query("SELECT 1").await?;
    }

    let config = ClientConfig::from_env()
        .compression(false)
        .retries(1)
        .autogenerate_session_id(true);
    let client = Client::new(config)?;
    assert!(client.session_id().is_some());
    client.query("SELECT 1").await?;

    let readonly = client.load_server_settings().await?;
    tracing::info!(readonly, timezone = ?client.server_timezone(), "connected");

    Ok(())
}
