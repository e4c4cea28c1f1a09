//! kboard API server binary.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::Context;

use kboard_api::config::Config;
use kboard_api::server::Server;
use kboard_core::observability::{init_logging, LogFormat};
use kboard_core::store::pg::PgStore;
use kboard_core::store::{MarketStore, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let format = if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    };
    init_logging(format);

    let store: Arc<dyn MarketStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("failed to connect to database")?;
            tracing::info!("connected to postgres");
            Arc::new(store)
        }
        None if config.debug => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
        None => anyhow::bail!("DATABASE_URL is required outside debug mode"),
    };

    let server = Server::with_store(config, store);
    server.serve().await.context("server exited with error")?;
    Ok(())
}
