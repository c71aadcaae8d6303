use std::sync::Arc;

use argh::FromArgs;
use tracing::info;

use super::listeners::insecure::InsecureListener;
use super::listeners::tls::TlsListener;
use super::ServerContext;
use crate::cache;
use crate::cache::{Cache, IdentityCache};
use crate::command::server::error::Error;
use crate::configuration::{Configuration, ServerTlsConfig};

pub enum ServiceListener {
    Insecure(InsecureListener),
    Secure(TlsListener),
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "serve",
    description = "Run the authentication chain behind an HTTP listener"
)]
pub struct Options {}

pub struct Command {
    listener: ServiceListener,
    identity_cache: Arc<IdentityCache>,
}

fn build_cache_backend(config: &cache::Config) -> Result<Arc<dyn Cache>, Error> {
    match config.to_backend() {
        Ok(cache) => Ok(cache),
        Err(err) => {
            let msg = format!("Failed to initialize identity cache: {err}");
            Err(Error::Initialization(msg))
        }
    }
}

impl Command {
    pub fn new(config: &Configuration) -> Result<Command, Error> {
        let identity_cache = Arc::new(IdentityCache::new(build_cache_backend(&config.cache)?));
        let context = ServerContext::new(config, &identity_cache)?;

        let listener = match &config.server.tls {
            None => ServiceListener::Insecure(InsecureListener::new(&config.server, context)),
            Some(tls_config) => {
                ServiceListener::Secure(TlsListener::new(&config.server, tls_config, context)?)
            }
        };

        Ok(Command {
            listener,
            identity_cache,
        })
    }

    /// Applies a new configuration; nothing is replaced unless every part of it could be built.
    ///
    /// Switching between TLS and plain listeners requires a restart.
    pub fn notify_config_change(&self, config: &Configuration) -> Result<(), Error> {
        let backend = build_cache_backend(&config.cache)?;
        let context = ServerContext::new(config, &self.identity_cache)?;

        match (&self.listener, &config.server.tls) {
            (ServiceListener::Insecure(listener), _) => {
                listener.notify_config_change(&config.server, context);
            }
            (ServiceListener::Secure(listener), Some(tls_config)) => {
                listener.notify_config_change(&config.server, tls_config, context)?;
            }
            (ServiceListener::Secure(_), None) => {
                let msg = "TLS cannot be disabled without a restart".to_string();
                return Err(Error::Execution(msg));
            }
        }

        // memory entries are dropped here; shared backends rely on mechanisms rechecking config
        self.identity_cache.update_client(backend);
        info!("Authentication chain reloaded");
        Ok(())
    }

    pub fn notify_tls_config_change(&self, tls_config: &ServerTlsConfig) -> Result<(), Error> {
        if let ServiceListener::Secure(listener) = &self.listener {
            listener.notify_tls_config_change(tls_config)?;
        }

        Ok(())
    }

    pub async fn run(&self) -> Result<(), Error> {
        match &self.listener {
            ServiceListener::Insecure(listener) => listener.serve().await,
            ServiceListener::Secure(listener) => listener.serve().await,
        }
    }
}
