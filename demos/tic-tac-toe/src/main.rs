use std::time::Duration;

use tandem::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Process settings read from the environment.
#[derive(Debug)]
struct Settings {
    addr: String,
    /// Shared store location; `None` keeps state in this process.
    redis_url: Option<String>,
    config: ServerConfig,
}

/// Reads settings from the environment:
///
/// - `TANDEM_ADDR`: bind address (default `0.0.0.0:8080`)
/// - `TANDEM_REDIS_URL`: Redis server shared by every instance
/// - `TANDEM_MATCH_INTERVAL_SECS`: seconds between matchmaking ticks
/// - `TANDEM_GRACE_SECS`: reconnect grace period in seconds
fn settings_from(var: impl Fn(&str) -> Option<String>) -> Settings {
    let addr = var("TANDEM_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let redis_url = var("TANDEM_REDIS_URL").filter(|url| !url.trim().is_empty());
    let mut config = ServerConfig::default();

    if let Some(secs) = secs(&var, "TANDEM_MATCH_INTERVAL_SECS") {
        config.matchmaking.interval = secs;
    }
    if let Some(secs) = secs(&var, "TANDEM_GRACE_SECS") {
        config.session.reconnect_grace = secs;
    }
    Settings {
        addr,
        redis_url,
        config,
    }
}

fn secs(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = var(name)?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(%name, value = %raw, "ignoring invalid duration");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = settings_from(|name| std::env::var(name).ok());
    tracing::info!(
        addr = %settings.addr,
        shared = settings.redis_url.is_some(),
        config = ?settings.config,
        "starting tic-tac-toe server"
    );

    match &settings.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            serve(&settings.addr, settings.config, store).await?;
        }
        None => serve(&settings.addr, settings.config, MemoryStore::new()).await?,
    }
    Ok(())
}

async fn serve<S: SharedStore>(
    addr: &str,
    config: ServerConfig,
    store: S,
) -> Result<(), TandemError> {
    let server = TandemServer::builder()
        .bind(addr)
        .config(config)
        .build::<TicTacToe, _>(store)
        .await?;
    server.run().await
}
