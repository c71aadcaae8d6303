use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::missing_credentials;
use crate::auth::{AuthMechanism, Error, Identity, Outcome};
use crate::pipeline::RequestContext;

/// Extension type for passing peer certificate data from TLS layer
#[derive(Clone, Debug)]
pub struct PeerCertificate(pub Arc<Vec<u8>>);

/// Subject names of a client certificate
///
/// Certificate validation (expiry, CA trust chain, etc.) is performed by the TLS layer during the
/// handshake: only certificates that passed it are parsed here.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CertificateSubject {
    pub common_names: Vec<String>,
    pub organizations: Vec<String>,
}

impl CertificateSubject {
    #[instrument(skip(der))]
    pub fn from_der(der: &[u8]) -> Option<Self> {
        let (_, cert) = match X509Certificate::from_der(der) {
            Ok(cert) => cert,
            Err(err) => {
                debug!("Failed to parse client certificate: {err:?}");
                return None;
            }
        };

        let subject = cert.subject();
        let common_names = subject
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok().map(String::from))
            .collect();
        let organizations = subject
            .iter_organization()
            .filter_map(|o| o.as_str().ok().map(String::from))
            .collect();

        Some(Self {
            common_names,
            organizations,
        })
    }

    pub fn from_request(request: &RequestContext) -> Option<Option<Self>> {
        let peer_cert = request.parts.extensions.get::<PeerCertificate>()?;
        Some(Self::from_der(&peer_cert.0))
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_names.first().map(String::as_str)
    }

    pub fn organization(&self) -> Option<&str> {
        self.organizations.first().map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optional: bool,
    /// Known certificate subjects, by common name
    #[serde(default)]
    pub subjects: HashMap<String, SubjectConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubjectConfig {
    #[serde(default = "SubjectConfig::default_is_active")]
    pub is_active: bool,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

impl SubjectConfig {
    fn default_is_active() -> bool {
        true
    }
}

/// Client certificates whose common name is listed in the configuration
pub struct CertificateMechanism {
    optional: bool,
    subjects: HashMap<String, SubjectConfig>,
}

impl CertificateMechanism {
    pub fn new(config: &Config) -> Self {
        Self {
            optional: config.optional,
            subjects: config.subjects.clone(),
        }
    }

    fn lookup(&self, subject: &CertificateSubject) -> Option<Identity> {
        let common_name = subject.common_name()?;
        let Some(known) = self.subjects.get(common_name) else {
            debug!("Unknown certificate subject: {common_name}");
            return None;
        };

        Some(Identity {
            id: Some(common_name.to_string()),
            username: Some(common_name.to_string()),
            org_id: known.org_id.clone(),
            is_active: known.is_active,
            account_number: known.account_number.clone(),
            ..Identity::default()
        })
    }
}

#[async_trait]
impl AuthMechanism for CertificateMechanism {
    fn name(&self) -> &str {
        "certificate"
    }

    async fn try_auth(&self, request: &RequestContext) -> Result<Outcome, Error> {
        let Some(subject) = CertificateSubject::from_request(request) else {
            return Ok(missing_credentials(self.optional));
        };

        Ok(subject
            .and_then(|subject| self.lookup(&subject))
            .map_or(Outcome::Absent, Outcome::Candidate))
    }
}
