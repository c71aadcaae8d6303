pub mod basic;
pub mod certificate;
pub mod system_id;
pub mod token;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::auth::{AuthMechanism, Error, MechanismErrorPolicy, Outcome};
use crate::cache::IdentityCache;
pub use basic::BasicMechanism;
pub use certificate::{CertificateMechanism, PeerCertificate};
pub use system_id::SystemIdMechanism;
pub use token::TokenMechanism;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MechanismKind {
    Basic,
    Token,
    Certificate,
    SystemId,
}

impl MechanismKind {
    pub fn name(self) -> &'static str {
        match self {
            MechanismKind::Basic => "basic",
            MechanismKind::Token => "token",
            MechanismKind::Certificate => "certificate",
            MechanismKind::SystemId => "system_id",
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `[chain]` section: which mechanisms run, in which order
#[derive(Clone, Debug, Deserialize)]
pub struct ChainConfig {
    pub mechanisms: Vec<MechanismKind>,
    pub on_mechanism_error: MechanismErrorPolicy,
}

/// `[mechanism.*]` sections
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    pub basic: Option<basic::Config>,
    pub token: Option<token::Config>,
    pub certificate: Option<certificate::Config>,
    #[serde(default)]
    pub system_id: system_id::Config,
}

/// Outcome of a mechanism that found none of its credentials in the request
pub fn missing_credentials(optional: bool) -> Outcome {
    if optional {
        Outcome::Skip
    } else {
        Outcome::Absent
    }
}

fn missing_section(kind: MechanismKind) -> Error {
    let msg = format!("mechanism '{kind}' is part of the chain but [mechanism.{kind}] is missing");
    Error::Configuration(msg)
}

/// Instantiates the mechanisms listed in the chain, preserving their order
pub fn build_mechanisms(
    chain: &ChainConfig,
    config: &Config,
    cache: &Arc<IdentityCache>,
) -> Result<Vec<Arc<dyn AuthMechanism>>, Error> {
    let mut seen = HashSet::new();
    let mut mechanisms: Vec<Arc<dyn AuthMechanism>> = Vec::with_capacity(chain.mechanisms.len());

    for kind in &chain.mechanisms {
        if !seen.insert(*kind) {
            let msg = format!("mechanism '{kind}' appears more than once in the chain");
            return Err(Error::Configuration(msg));
        }

        let mechanism: Arc<dyn AuthMechanism> = match kind {
            MechanismKind::Basic => {
                let config = config.basic.as_ref().ok_or_else(|| missing_section(*kind))?;
                Arc::new(BasicMechanism::new(config, Arc::clone(cache)))
            }
            MechanismKind::Token => {
                let config = config.token.as_ref().ok_or_else(|| missing_section(*kind))?;
                Arc::new(TokenMechanism::new(config)?)
            }
            MechanismKind::Certificate => {
                let config = config
                    .certificate
                    .as_ref()
                    .ok_or_else(|| missing_section(*kind))?;
                Arc::new(CertificateMechanism::new(config))
            }
            MechanismKind::SystemId => Arc::new(SystemIdMechanism::new(&config.system_id)),
        };
        mechanisms.push(mechanism);
    }

    Ok(mechanisms)
}
