use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use hyper_util::rt::TokioIo;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use super::{accept, binding_address, build_listener, build_timeouts};
use crate::command::server::error::Error;
use crate::command::server::http_server::serve_request;
use crate::command::server::ServerContext;
use crate::configuration::{self, ServerConfig, ServerTlsConfig};

pub struct TlsListener {
    binding_address: SocketAddr,
    tls_acceptor: ArcSwap<TlsAcceptor>,
    context: ArcSwap<ServerContext>,
    timeouts: ArcSwap<[Duration; 2]>,
}

impl TlsListener {
    pub fn new(
        config: &ServerConfig,
        tls_config: &ServerTlsConfig,
        context: ServerContext,
    ) -> Result<Self, configuration::Error> {
        let tls_acceptor = ArcSwap::from_pointee(Self::build_tls_acceptor(tls_config)?);

        Ok(Self {
            binding_address: binding_address(config),
            tls_acceptor,
            context: ArcSwap::from_pointee(context),
            timeouts: ArcSwap::from_pointee(build_timeouts(config)),
        })
    }

    pub fn notify_config_change(
        &self,
        config: &ServerConfig,
        tls_config: &ServerTlsConfig,
        context: ServerContext,
    ) -> Result<(), configuration::Error> {
        let acceptor = Arc::new(Self::build_tls_acceptor(tls_config)?);
        self.tls_acceptor.store(acceptor);
        self.timeouts.store(Arc::new(build_timeouts(config)));
        self.context.store(Arc::new(context));

        Ok(())
    }

    pub fn notify_tls_config_change(
        &self,
        tls_config: &ServerTlsConfig,
    ) -> Result<(), configuration::Error> {
        let acceptor = Arc::new(Self::build_tls_acceptor(tls_config)?);
        self.tls_acceptor.store(acceptor);

        Ok(())
    }

    fn build_tls_acceptor(
        tls_config: &ServerTlsConfig,
    ) -> Result<TlsAcceptor, configuration::Error> {
        debug!("Detected TLS configuration");
        let server_certs = CertificateDer::pem_file_iter(&tls_config.server_certificate_bundle)?
            .collect::<Result<_, _>>()?;
        let server_key = PrivateKeyDer::from_pem_file(&tls_config.server_private_key)?;

        let server_config = if let Some(client_ca_bundle) = tls_config.client_ca_bundle.as_ref() {
            debug!("Client CA bundle detected (client certificates will be requested)");
            let client_certs: Vec<CertificateDer> =
                CertificateDer::pem_file_iter(client_ca_bundle)?.collect::<Result<_, _>>()?;

            let mut client_cert_store = RootCertStore::empty();
            for client_cert in client_certs {
                client_cert_store.add(client_cert)?;
            }

            // requests without a client certificate still reach the chain
            let client_cert_verifier = WebPkiClientVerifier::builder(Arc::new(client_cert_store))
                .allow_unauthenticated()
                .build()?;

            rustls::ServerConfig::builder()
                .with_client_cert_verifier(client_cert_verifier)
                .with_single_cert(server_certs, server_key)?
        } else {
            debug!("No client CA bundle detected (certificate mechanisms will find no credentials)");

            rustls::ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(server_certs, server_key)?
        };

        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }

    pub async fn serve(&self) -> Result<(), Error> {
        info!("Listening on {} (TLS)", self.binding_address);
        let listener = build_listener(self.binding_address).await?;

        loop {
            let (tcp, remote_address) = accept(&listener).await?;

            let tls_acceptor = self.tls_acceptor.load_full();
            let tls = match tls_acceptor.accept(tcp).await {
                Ok(tls) => tls,
                Err(err) => {
                    debug!("TLS handshake with {remote_address} failed: {err}");
                    continue;
                }
            };

            let (_, session) = tls.get_ref();
            let peer_certificate = session
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|cert| cert.to_vec());

            let stream = TokioIo::new(tls);
            let context = Arc::clone(&self.context.load());
            let timeouts = Arc::clone(&self.timeouts.load());

            tokio::spawn(Box::pin(serve_request(
                stream,
                context,
                peer_certificate,
                timeouts,
                remote_address,
            )));
        }
    }
}
