use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use hyper::StatusCode;
use tokio::sync::oneshot;
use tracing::debug;

use crate::auth::{Failure, Identity};

/// Why a chain execution did not accept the request
#[derive(Clone, Debug, PartialEq)]
pub enum ChainFailure {
    /// The last mechanism failed; carries the surfaced condition
    Terminal(Failure),
    /// A mechanism could not run and the error policy failed the chain closed
    Mechanism { mechanism: String, message: String },
    /// The signal was dropped before the chain settled it
    Abandoned,
}

impl ChainFailure {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChainFailure::Terminal(failure) => failure.status_code(),
            ChainFailure::Mechanism { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ChainFailure::Abandoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainFailure::Terminal(failure) => write!(f, "{failure}"),
            ChainFailure::Mechanism { mechanism, message } => {
                write!(f, "Mechanism '{mechanism}' failed: {message}")
            }
            ChainFailure::Abandoned => write!(f, "Chain execution abandoned"),
        }
    }
}

/// `Ok(None)` means the chain accepted the request without an identity (skip).
pub type ChainResult = Result<Option<Identity>, ChainFailure>;

/// Settling half of the aggregate completion signal.
///
/// Clones share the same underlying slot: the first settlement wins, later ones are no-ops.
#[derive(Clone, Debug)]
pub struct CompletionSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<ChainResult>>>>,
}

/// Awaiting half of the aggregate completion signal
#[derive(Debug)]
pub struct Completion {
    receiver: oneshot::Receiver<ChainResult>,
}

pub fn completion_signal() -> (CompletionSignal, Completion) {
    let (sender, receiver) = oneshot::channel();
    let signal = CompletionSignal {
        sender: Arc::new(Mutex::new(Some(sender))),
    };

    (signal, Completion { receiver })
}

impl CompletionSignal {
    pub fn resolve(&self, identity: Option<Identity>) -> bool {
        self.settle(Ok(identity))
    }

    pub fn reject(&self, failure: ChainFailure) -> bool {
        self.settle(Err(failure))
    }

    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, result: ChainResult) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(sender) = sender else {
            debug!("Completion signal already settled, ignoring");
            return false;
        };

        if sender.send(result).is_err() {
            debug!("Completion receiver dropped before settlement");
        }
        true
    }
}

impl Completion {
    pub async fn wait(self) -> ChainResult {
        self.receiver.await.unwrap_or(Err(ChainFailure::Abandoned))
    }
}
