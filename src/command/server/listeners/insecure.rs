use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use hyper_util::rt::TokioIo;
use tracing::{debug, info};

use super::{accept, binding_address, build_listener, build_timeouts};
use crate::command::server::error::Error;
use crate::command::server::http_server::serve_request;
use crate::command::server::ServerContext;
use crate::configuration::ServerConfig;

pub struct InsecureListener {
    binding_address: SocketAddr,
    context: ArcSwap<ServerContext>,
    timeouts: ArcSwap<[Duration; 2]>,
}

impl InsecureListener {
    pub fn new(config: &ServerConfig, context: ServerContext) -> Self {
        Self {
            binding_address: binding_address(config),
            context: ArcSwap::from_pointee(context),
            timeouts: ArcSwap::from_pointee(build_timeouts(config)),
        }
    }

    pub fn notify_config_change(&self, config: &ServerConfig, context: ServerContext) {
        self.timeouts.store(Arc::new(build_timeouts(config)));
        self.context.store(Arc::new(context));
    }

    pub async fn serve(&self) -> Result<(), Error> {
        info!("Listening on {} (non-TLS)", self.binding_address);
        let listener = build_listener(self.binding_address).await?;

        loop {
            debug!("Waiting for incoming connection");
            let (tcp, remote_address) = accept(&listener).await?;

            let stream = TokioIo::new(tcp);
            let context = Arc::clone(&self.context.load());
            let timeouts = Arc::clone(&self.timeouts.load());

            tokio::spawn(Box::pin(serve_request(
                stream,
                context,
                None,
                timeouts,
                remote_address,
            )));
        }
    }
}
