pub mod account;
pub mod chain;
pub mod completion;
mod error;
pub mod failure;
pub mod mechanism;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use account::{is_valid_account_number, validate};
pub use chain::{exec_chain, MechanismErrorPolicy};
pub use completion::{completion_signal, ChainFailure, Completion, CompletionSignal};
pub use error::Error;
pub use failure::Failure;

use crate::pipeline::RequestContext;

/// A resolved principal.
///
/// `mechanism` is stamped by the chain executor once the identity has been accepted; mechanisms
/// leave it empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<String>,
}

/// What a mechanism resolved to for one request.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The mechanism does not apply to this request and lets it pass without an identity.
    Skip,
    /// No identity could be resolved.
    Absent,
    /// An identity was resolved; it may still be inactive or carry a malformed account number.
    Candidate(Identity),
}

impl Outcome {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Outcome::Candidate(identity) => Some(identity),
            Outcome::Skip | Outcome::Absent => None,
        }
    }
}

/// One pluggable authentication strategy of a chain.
#[async_trait]
pub trait AuthMechanism: Send + Sync {
    /// Name stamped on identities accepted through this mechanism
    fn name(&self) -> &str;

    /// Try to resolve the identity behind the request
    ///
    /// Returns:
    /// - `Ok(Outcome::Skip)` if the mechanism does not apply and the request may pass anonymously
    /// - `Ok(Outcome::Absent)` if no identity could be resolved from the request
    /// - `Ok(Outcome::Candidate(_))` with the resolved identity, valid or not
    /// - `Err(Error)` only when the mechanism itself could not run (backend unavailable, ...)
    async fn try_auth(&self, request: &RequestContext) -> Result<Outcome, Error>;
}
