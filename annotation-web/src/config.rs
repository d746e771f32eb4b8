use std::{collections::HashMap, net::SocketAddr, str::FromStr};

use anyhow::Context;
use config::{Environment, File, FileFormat, builder::DefaultState};
use dotenvy::vars;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// The bucket that every uploaded file lands in.
    pub bucket: String,
    pub database_url: String,
    pub google_api_key: String,
    pub bind_addr: SocketAddr,
    /// Service account file for the object store. When absent, OpenDAL
    /// falls back to its own credential discovery.
    pub credential_path: Option<String>,
    pub public_base_url: String,
}

pub fn parse_config() -> anyhow::Result<AppConfig> {
    let dotenv_variables = HashMap::from_iter(vars());

    let config = config::ConfigBuilder::<DefaultState>::default()
        .add_source(Environment::default())
        .add_source(Environment::default().source(Some(dotenv_variables)))
        .add_source(File::new("config.toml", FileFormat::Toml).required(false))
        .build()
        .context("Failed to build configuration")?;

    AppConfig::from_source(config)
}

impl AppConfig {
    pub fn from_source(config: config::Config) -> anyhow::Result<Self> {
        let bucket = config
            .get_string("cloud_storage_bucket")
            .context("You should define the CLOUD_STORAGE_BUCKET. Uploaded files are stored there.")?;

        let database_url = config
            .get_string("database_url")
            .context("You should define the DATABASE_URL.")?;

        let google_api_key = config.get_string("google_api_key").context(
            "You should define the GOOGLE_API_KEY. It is required for the Vision and Natural Language APIs.",
        )?;

        let bind_addr = config
            .get_string("bind_addr")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = SocketAddr::from_str(&bind_addr).context("Invalid BIND_ADDR")?;

        let credential_path = config.get_string("google_application_credentials").ok();

        if credential_path.is_none() {
            tracing::warn!(
                "GOOGLE_APPLICATION_CREDENTIALS not set. The object store will try the default credential chain."
            );
        }

        let public_base_url = config
            .get_string("storage_public_base_url")
            .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.to_string());

        Ok(Self {
            bucket,
            database_url,
            google_api_key,
            bind_addr,
            credential_path,
            public_base_url,
        })
    }
}
