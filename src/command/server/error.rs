use std::fmt;

use hyper::StatusCode;
use serde_json::json;

use crate::{auth, configuration};

#[derive(Debug, PartialEq)]
pub enum Error {
    Initialization(String),
    Execution(String),
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Initialization(err) | Error::Execution(err) => write!(f, "{err}"),
            Error::Internal(err) => write!(f, "Internal Server Error: {err}"),
        }
    }
}

impl From<configuration::Error> for Error {
    fn from(error: configuration::Error) -> Self {
        Error::Initialization(error.to_string())
    }
}

impl From<auth::Error> for Error {
    fn from(error: auth::Error) -> Self {
        Error::Initialization(error.to_string())
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Initialization(_) | Error::Execution(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_json(&self, request_id: Option<&String>) -> serde_json::Value {
        let message = match self {
            Error::Initialization(msg) | Error::Execution(msg) | Error::Internal(msg) => msg,
        };

        if let Some(request_id) = request_id {
            json!({
                "message": message,
                "request_id": request_id,
            })
        } else {
            json!({ "message": message })
        }
    }
}
