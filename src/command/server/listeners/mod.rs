use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::command::server::error::Error;
use crate::configuration::ServerConfig;

pub mod insecure;
pub mod tls;

fn binding_address(config: &ServerConfig) -> SocketAddr {
    SocketAddr::new(config.bind_address, config.port)
}

/// Request timeout followed by the graceful shutdown period
fn build_timeouts(config: &ServerConfig) -> [Duration; 2] {
    [
        Duration::from_secs(config.query_timeout),
        Duration::from_secs(config.query_timeout_grace_period),
    ]
}

async fn build_listener(binding_address: SocketAddr) -> Result<TcpListener, Error> {
    match TcpListener::bind(binding_address).await {
        Ok(listener) => Ok(listener),
        Err(err) => {
            let msg = format!("Failed to bind to {binding_address}: {err}");
            Err(Error::Initialization(msg))
        }
    }
}

async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), Error> {
    match listener.accept().await {
        Ok((stream, remote_address)) => {
            debug!("Accepted connection from {remote_address}");
            Ok((stream, remote_address))
        }
        Err(err) => {
            let msg = format!("Failed to accept incoming connection: {err}");
            Err(Error::Execution(msg))
        }
    }
}
