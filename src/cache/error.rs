use std::fmt;

use redis::RedisError;
use tracing::warn;

#[derive(Debug, PartialEq)]
pub enum Error {
    Backend(String),
    Execution(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Backend(err) | Error::Execution(err) => write!(f, "{err}"),
        }
    }
}

impl From<RedisError> for Error {
    fn from(error: RedisError) -> Self {
        warn!("Redis identity cache error: {error}");
        Error::Backend("Backend error".to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Execution(format!("Malformed cached identity: {error}"))
    }
}
