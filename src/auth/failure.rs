use std::fmt;

use hyper::{Response, StatusCode};
use serde_json::json;

use crate::auth::{is_valid_account_number, Outcome};
use crate::pipeline::{empty_response, json_response, ResponseBody};

/// Terminal condition emitted once the last mechanism of a chain failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    NoCredentials,
    Inactive,
    NoAccount,
    Unexpected,
}

impl Failure {
    /// Classifies the outcome of the last mechanism.
    ///
    /// Each check presupposes the previous ones did not match.
    pub fn classify(outcome: &Outcome) -> Self {
        let Outcome::Candidate(identity) = outcome else {
            return match outcome {
                Outcome::Absent => Failure::NoCredentials,
                _ => Failure::Unexpected,
            };
        };

        if !identity.is_active {
            return Failure::Inactive;
        }

        if !is_valid_account_number(identity.account_number.as_deref()) {
            return Failure::NoAccount;
        }

        Failure::Unexpected
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            Failure::NoCredentials => StatusCode::UNAUTHORIZED,
            Failure::Inactive | Failure::Unexpected => StatusCode::FORBIDDEN,
            Failure::NoAccount => StatusCode::PAYMENT_REQUIRED,
        }
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            Failure::NoCredentials => None,
            Failure::Inactive => Some("Forbidden: user is not active"),
            Failure::NoAccount => Some("No Red Hat account found"),
            Failure::Unexpected => Some("Auth failed, in an unexpected way"),
        }
    }

    pub fn to_response(self) -> Response<ResponseBody> {
        match self.message() {
            Some(message) => json_response(self.status_code(), &json!({ "message": message })),
            None => empty_response(self.status_code()),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{} {message}", self.status_code().as_u16()),
            None => write!(f, "{} No credentials", self.status_code().as_u16()),
        }
    }
}
