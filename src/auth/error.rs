use std::fmt;

use tracing::debug;

use crate::cache;

#[derive(Debug, PartialEq)]
pub enum Error {
    Configuration(String),
    Cache(cache::Error),
    Backend(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "Authentication chain configuration error: {err}"),
            Error::Cache(err) => write!(f, "Identity cache error: {err}"),
            Error::Backend(err) => write!(f, "Authentication backend error: {err}"),
        }
    }
}

impl From<cache::Error> for Error {
    fn from(error: cache::Error) -> Self {
        debug!("Identity cache error: {error}");
        Error::Cache(error)
    }
}
