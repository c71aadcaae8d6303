use crate::cache::{Cache, Error};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::info;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default = "BackendConfig::default_key_prefix")]
    pub key_prefix: String,
}

impl BackendConfig {
    fn default_key_prefix() -> String {
        "auth-chain:".to_string()
    }
}

/// Identity store shared by every instance pointed at the same Redis database
#[derive(Debug)]
pub struct Backend {
    client: redis::Client,
    key_prefix: String,
}

impl Backend {
    pub fn new(config: &BackendConfig) -> Result<Self, Error> {
        info!("Using Redis identity cache");
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Backend {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, Error> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Cache for Backend {
    async fn store_value(&self, key: &str, value: &str, expires_in: u64) -> Result<(), Error> {
        let mut conn = self.connection().await?;
        Ok(conn.set_ex(self.prefixed(key), value, expires_in).await?)
    }

    async fn retrieve_value(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.connection().await?;
        Ok(conn.get(self.prefixed(key)).await?)
    }

    async fn delete_value(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.connection().await?;
        Ok(conn.del(self.prefixed(key)).await?)
    }
}
