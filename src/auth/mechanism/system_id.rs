use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::certificate::CertificateSubject;
use super::missing_credentials;
use crate::auth::{AuthMechanism, Error, Identity, Outcome};
use crate::pipeline::RequestContext;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optional: bool,
    /// When not empty, only certificates issued to one of these organizations are accepted
    #[serde(default)]
    pub allowed_organizations: Vec<String>,
}

/// System identities derived from the client certificate subject: the common name is the system
/// id, the organization is the account number.
pub struct SystemIdMechanism {
    optional: bool,
    allowed_organizations: Vec<String>,
}

impl SystemIdMechanism {
    pub fn new(config: &Config) -> Self {
        Self {
            optional: config.optional,
            allowed_organizations: config.allowed_organizations.clone(),
        }
    }

    fn to_identity(&self, subject: &CertificateSubject) -> Option<Identity> {
        let system_id = subject.common_name()?;
        let organization = subject.organization();

        if !self.allowed_organizations.is_empty()
            && !organization.is_some_and(|o| self.allowed_organizations.iter().any(|a| a == o))
        {
            debug!("Organization {organization:?} of system {system_id} is not allowed");
            return None;
        }

        Some(Identity {
            id: Some(system_id.to_string()),
            system_id: Some(system_id.to_string()),
            is_active: true,
            account_number: organization.map(ToString::to_string),
            ..Identity::default()
        })
    }
}

#[async_trait]
impl AuthMechanism for SystemIdMechanism {
    fn name(&self) -> &str {
        "system_id"
    }

    async fn try_auth(&self, request: &RequestContext) -> Result<Outcome, Error> {
        let Some(subject) = CertificateSubject::from_request(request) else {
            return Ok(missing_credentials(self.optional));
        };

        Ok(subject
            .and_then(|subject| self.to_identity(&subject))
            .map_or(Outcome::Absent, Outcome::Candidate))
    }
}
