pub(crate) mod config;
pub(crate) mod handlers;
pub(crate) mod language;
pub(crate) mod page;
pub(crate) mod records;
pub(crate) mod storage;
#[cfg(test)]
pub(crate) mod testing;
pub(crate) mod vision;

use std::sync::Arc;

use anyhow::Context as _;
use handlers::AppState;
use language::{LANGUAGE_ENDPOINT, LanguageClient};
use poem::{Server, listener::TcpListener};
use records::PgRecordStore;
use storage::Storage;
use vision::{VISION_ENDPOINT, VisionClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config::parse_config()?;

    let storage = Storage::from_config(&config).context("Failed to build storage")?;

    let http_client = reqwest::Client::new();
    let vision = VisionClient::new(http_client.clone(), VISION_ENDPOINT, &config.google_api_key);
    let language = LanguageClient::new(http_client, LANGUAGE_ENDPOINT, &config.google_api_key);

    let records = PgRecordStore::connect(&config.database_url).await?;

    let state = AppState {
        storage: Arc::new(storage),
        faces: Arc::new(vision),
        sentiment: Arc::new(language),
        records: Arc::new(records),
    };

    tracing::info!(
        "Uploading to bucket {bucket}. Visit http://{addr} to upload photos and texts.",
        bucket = config.bucket,
        addr = config.bind_addr
    );

    Server::new(TcpListener::bind(config.bind_addr))
        .run(handlers::app(state))
        .await
        .context("The HTTP server stopped unexpectedly")?;

    Ok(())
}
