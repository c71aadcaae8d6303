use std::{fmt, io};

use opentelemetry_otlp::ExporterBuildError;
use rustls_pki_types::pem;
use tracing::debug;

use crate::{auth, cache};

#[derive(Debug)]
pub enum Error {
    Cache(cache::Error),
    Chain(auth::Error),
    Io(io::Error),
    ConfigurationFileFormat(String),
    Tls(String),
    ExporterInit(ExporterBuildError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Cache(err) => write!(f, "Cache error: {err}"),
            Error::Chain(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::ConfigurationFileFormat(error) => {
                write!(f, "Configuration file format error.")?;
                write!(f, "{error}")
            }
            Error::Tls(error) => {
                write!(f, "TLS error: {error}")
            }
            Error::ExporterInit(error) => {
                write!(f, "Exporter initialization error: {error}")
            }
        }
    }
}

impl From<cache::Error> for Error {
    fn from(error: cache::Error) -> Self {
        debug!("Cache error: {error}");
        Error::Cache(error)
    }
}

impl From<auth::Error> for Error {
    fn from(error: auth::Error) -> Self {
        debug!("Authentication chain error: {error}");
        Error::Chain(error)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        debug!("TOML error: {error}");
        Error::ConfigurationFileFormat(error.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<rustls::server::VerifierBuilderError> for Error {
    fn from(err: rustls::server::VerifierBuilderError) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<pem::Error> for Error {
    fn from(err: pem::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<ExporterBuildError> for Error {
    fn from(error: ExporterBuildError) -> Self {
        Error::ExporterInit(error)
    }
}
