
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::PasswordHashString;
use argon2::{Argon2, PasswordVerifier};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use super::missing_credentials;
use crate::auth::{AuthMechanism, Error, Identity, Outcome};
use crate::cache::IdentityCache;
use crate::pipeline::{HeaderExt, RequestContext};

static NAME: &str = "basic";

static DIGEST_SECRET: LazyLock<[u8; 32]> = LazyLock::new(|| {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    secret
});

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optional: bool,
    #[serde(default = "Config::default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default)]
    pub users: HashMap<String, UserConfig>,
}

impl Config {
    fn default_cache_ttl() -> u64 {
        60
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default = "UserConfig::default_is_active")]
    pub is_active: bool,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

impl UserConfig {
    fn default_is_active() -> bool {
        true
    }
}

struct User {
    id: String,
    password: PasswordHashString,
    is_active: bool,
    account_number: Option<String>,
    org_id: Option<String>,
}

impl User {
    fn to_identity(&self, username: &str) -> Identity {
        Identity {
            id: Some(self.id.clone()),
            username: Some(username.to_string()),
            org_id: self.org_id.clone(),
            is_active: self.is_active,
            account_number: self.account_number.clone(),
            ..Identity::default()
        }
    }
}

fn build_users(users: &HashMap<String, UserConfig>) -> HashMap<String, User> {
    let mut credentials = HashMap::new();
    for (id, config) in users {
        let password = match PasswordHashString::new(&config.password) {
            Ok(hash) => hash,
            Err(err) => {
                warn!("Invalid password hash for user {}: {err}", config.username);
                continue;
            }
        };

        let user = User {
            id: id.clone(),
            password,
            is_active: config.is_active,
            account_number: config.account_number.clone(),
            org_id: config.org_id.clone(),
        };
        credentials.insert(config.username.clone(), user);
    }

    credentials
}

/// Cache key for a verified password, bound to the configured hash and keyed with a
/// per-process secret so the cache never holds a plain digest of the credentials.
fn credentials_digest(user: &User, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(*DIGEST_SECRET);
    for field in [user.id.as_str(), user.password.as_str(), password] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Username and password checked against argon2 hashes from the configuration
pub struct BasicMechanism {
    optional: bool,
    cache_ttl: u64,
    users: HashMap<String, User>,
    cache: Arc<IdentityCache>,
}

impl BasicMechanism {
    pub fn new(config: &Config, cache: Arc<IdentityCache>) -> Self {
        Self {
            optional: config.optional,
            cache_ttl: config.cache_ttl,
            users: build_users(&config.users),
            cache,
        }
    }

    #[instrument(skip(user, password))]
    fn verify_password(user: &User, password: &str) -> bool {
        match Argon2::default().verify_password(password.as_bytes(), &user.password.password_hash())
        {
            Ok(()) => true,
            Err(error) => {
                debug!("Password verification failed: {error}");
                false
            }
        }
    }
}

#[async_trait]
impl AuthMechanism for BasicMechanism {
    fn name(&self) -> &str {
        NAME
    }

    async fn try_auth(&self, request: &RequestContext) -> Result<Outcome, Error> {
        let Some((username, password)) = request.parts.basic_auth() else {
            return Ok(missing_credentials(self.optional));
        };

        let Some(user) = self.users.get(&username) else {
            debug!("Username not found in credentials");
            return Ok(Outcome::Absent);
        };

        let identity = user.to_identity(&username);
        let digest = credentials_digest(user, &password);
        let cached = self.cache.retrieve(NAME, &digest).await?;
        if cached.is_some_and(|cached| cached.id == identity.id) {
            return Ok(Outcome::Candidate(identity));
        }

        if !Self::verify_password(user, &password) {
            return Ok(Outcome::Absent);
        }

        self.cache
            .store(NAME, &digest, &identity, self.cache_ttl)
            .await?;
        Ok(Outcome::Candidate(identity))
    }
}
