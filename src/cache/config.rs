use std::sync::Arc;

use serde::Deserialize;

use crate::cache;
use crate::cache::{Cache, Error};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub enum Config {
    #[default]
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "redis")]
    Redis(cache::redis::BackendConfig),
}

impl Config {
    pub fn to_backend(&self) -> Result<Arc<dyn Cache>, Error> {
        match self {
            Config::Redis(config) => Ok(Arc::new(cache::redis::Backend::new(config)?)),
            Config::Memory => Ok(Arc::new(cache::memory::Backend::new())),
        }
    }
}
