use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::missing_credentials;
use crate::auth::{AuthMechanism, Error, Identity, Outcome};
use crate::pipeline::{HeaderExt, RequestContext};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "Config::default_leeway")]
    pub leeway: u64,
}

impl Config {
    fn default_leeway() -> u64 {
        60
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default = "Claims::default_is_active")]
    is_active: bool,
    #[serde(default)]
    account_number: Option<Value>,
    #[serde(default)]
    org_id: Option<String>,
}

impl Claims {
    fn default_is_active() -> bool {
        true
    }

    fn into_identity(self) -> Identity {
        // numeric account numbers are kept in their decimal form
        let account_number = match self.account_number {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value),
            Some(value) => Some(value.to_string()),
        };

        Identity {
            id: Some(self.sub),
            username: self.preferred_username,
            org_id: self.org_id,
            is_active: self.is_active,
            account_number,
            ..Identity::default()
        }
    }
}

fn load_public_key(config: &Config) -> Result<Vec<u8>, Error> {
    let Some(path) = &config.public_key_file else {
        let msg = format!(
            "token algorithm {:?} requires a 'public_key_file'",
            config.algorithm
        );
        return Err(Error::Configuration(msg));
    };

    fs::read(path).map_err(|err| {
        let msg = format!("failed to read public key {}: {err}", path.display());
        Error::Configuration(msg)
    })
}

fn build_decoding_key(config: &Config) -> Result<DecodingKey, Error> {
    let key = match config.algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            let Some(secret) = &config.secret else {
                let msg = format!("token algorithm {:?} requires a 'secret'", config.algorithm);
                return Err(Error::Configuration(msg));
            };
            Ok(DecodingKey::from_secret(secret.as_bytes()))
        }
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(&load_public_key(config)?),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(&load_public_key(config)?),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(&load_public_key(config)?),
    };

    key.map_err(|err| Error::Configuration(format!("invalid token public key: {err}")))
}

/// Bearer JSON web tokens signed with a shared secret or a public key
pub struct TokenMechanism {
    optional: bool,
    key: DecodingKey,
    validation: Validation,
}

impl TokenMechanism {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let key = build_decoding_key(config)?;

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = config.leeway;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &config.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        Ok(Self {
            optional: config.optional,
            key,
            validation,
        })
    }

    #[instrument(skip_all)]
    fn validate_token(&self, token: &str) -> Option<Identity> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(data.claims.into_identity()),
            Err(err) => {
                debug!("Token validation failed: {err}");
                None
            }
        }
    }
}

#[async_trait]
impl AuthMechanism for TokenMechanism {
    fn name(&self) -> &str {
        "token"
    }

    async fn try_auth(&self, request: &RequestContext) -> Result<Outcome, Error> {
        let Some(token) = request.parts.bearer_token() else {
            return Ok(missing_credentials(self.optional));
        };

        Ok(self
            .validate_token(&token)
            .map_or(Outcome::Absent, Outcome::Candidate))
    }
}
