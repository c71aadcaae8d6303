use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;
mod config;
mod error;
mod identity;
mod memory;
mod redis;

pub use config::Config;
pub use error::Error;
pub use identity::IdentityCache;

/// Key/value store with per-entry expiry, shared by the mechanisms through [`IdentityCache`]
#[async_trait]
pub trait Cache: Any + Debug + Send + Sync {
    /// Store `value` under `key` for `expires_in` seconds
    async fn store_value(&self, key: &str, value: &str, expires_in: u64) -> Result<(), Error>;

    /// Retrieve the value stored under `key`
    ///
    /// Returns `Ok(None)` when the key is unknown or its entry expired.
    async fn retrieve_value(&self, key: &str) -> Result<Option<String>, Error>;

    /// Drop the entry stored under `key`, if any
    async fn delete_value(&self, key: &str) -> Result<(), Error>;
}
