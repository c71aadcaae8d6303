use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::auth::Identity;
use crate::cache::{Cache, Error};

/// Process-scoped cache of resolved identities.
///
/// Mechanisms read and write through it; the backend client can be replaced at any time
/// through [`IdentityCache::update_client`] without disturbing requests in flight, which keep
/// the client they started with.
pub struct IdentityCache {
    client: ArcSwap<Arc<dyn Cache>>,
}

fn cache_key(namespace: &str, key: &str) -> String {
    format!("identity:{namespace}:{key}")
}

impl IdentityCache {
    pub fn new(client: Arc<dyn Cache>) -> Self {
        Self {
            client: ArcSwap::from_pointee(client),
        }
    }

    /// Replaces the backend used by every subsequent lookup
    pub fn update_client(&self, client: Arc<dyn Cache>) {
        info!("Updating identity cache client: {client:?}");
        self.client.store(Arc::new(client));
    }

    pub fn client(&self) -> Arc<dyn Cache> {
        Arc::clone(&self.client.load())
    }

    pub async fn retrieve(&self, namespace: &str, key: &str) -> Result<Option<Identity>, Error> {
        let key = cache_key(namespace, key);
        let Some(cached) = self.client().retrieve_value(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&cached) {
            Ok(identity) => {
                debug!("Using cached identity for key: {key}");
                Ok(Some(identity))
            }
            Err(error) => {
                warn!("Failed to deserialize cached identity for key {key}: {error}");
                Err(error.into())
            }
        }
    }

    pub async fn store(
        &self,
        namespace: &str,
        key: &str,
        identity: &Identity,
        ttl: u64,
    ) -> Result<(), Error> {
        let key = cache_key(namespace, key);
        let serialized = serde_json::to_string(identity)?;
        self.client().store_value(&key, &serialized, ttl).await
    }

    pub async fn invalidate(&self, namespace: &str, key: &str) -> Result<(), Error> {
        self.client().delete_value(&cache_key(namespace, key)).await
    }
}
