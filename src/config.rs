//! Process-wide configuration.
//!
//! A [`SharedConfig`] is created once at the composition root and handed to
//! every gate, token, and key provider. There is no ambient global: code
//! that needs a default reads it through the handle at the moment of use,
//! so a change between two requests is observed by the next read instead
//! of a snapshot taken at request start.
//!
//! Every option can also be overridden per instance (per [`crate::BearerGate`],
//! per [`crate::Jwt`], per [`crate::PublicKeyProvider`]); an instance value
//! always beats the process default.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::DecodingKey;

use crate::error::KeyError;
use crate::middleware::bearer_auth::{Authenticator, FailedResponder, MalformedResponder};
use crate::services::auth::jwt::VerificationOptions;
use crate::services::auth::public_key::{PublicKeyProvider, VerificationKeySupplier};

const LOCK: &str = "configuration lock poisoned";

/// The process-wide defaults.
///
/// Usually manipulated through [`SharedConfig::update`] rather than held
/// directly.
pub struct GateConfig {
    /// Decides whether a structurally valid token is accepted. Rejects
    /// everything until configured.
    pub authenticator: Arc<dyn Authenticator>,

    /// Invoked for headers that do not match the bearer scheme or the
    /// three-segment token shape. Defaults to a plain 400.
    pub malformed_handler: Arc<dyn MalformedResponder>,

    /// Invoked for well-formed tokens the authenticator rejected.
    /// Defaults to a plain 401.
    pub failed_handler: Arc<dyn FailedResponder>,

    /// Where the RSA public key lives: a local path or an HTTP(S) URL.
    pub rsa_public_key_url: Option<String>,

    /// Whether fetched keys are cached between requests.
    pub rsa_public_key_caching: bool,

    /// How long a cached key stays live.
    pub rsa_public_key_expiration: Duration,

    /// Expected `iss` claim; the check is disabled while unset.
    pub jwt_issuer: Option<String>,

    /// The audience this service expects to find in the `aud` claim; the
    /// check is disabled while unset.
    pub jwt_beholder: Option<String>,

    /// Explicit verification options. When unset, options are built at
    /// call time from `jwt_issuer`/`jwt_beholder` with the opinionated
    /// defaults (RS256, 30 seconds of expiry leeway).
    pub jwt_options: Option<VerificationOptions>,

    /// Source of the verification key. Defaults to a [`PublicKeyProvider`]
    /// reading the `rsa_public_key_*` settings above.
    pub jwt_verification_key: Option<Arc<dyn VerificationKeySupplier>>,
}

impl GateConfig {
    fn new() -> Self {
        Self {
            authenticator: Arc::new(reject_all),
            malformed_handler: Arc::new(default_malformed_handler),
            failed_handler: Arc::new(default_failed_handler),
            rsa_public_key_url: None,
            rsa_public_key_caching: false,
            rsa_public_key_expiration: Duration::from_secs(60 * 60),
            jwt_issuer: None,
            jwt_beholder: None,
            jwt_options: None,
            jwt_verification_key: None,
        }
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Callbacks and key suppliers are not printable
        f.debug_struct("GateConfig")
            .field("rsa_public_key_url", &self.rsa_public_key_url)
            .field("rsa_public_key_caching", &self.rsa_public_key_caching)
            .field("rsa_public_key_expiration", &self.rsa_public_key_expiration)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_beholder", &self.jwt_beholder)
            .field("jwt_options", &self.jwt_options)
            .finish_non_exhaustive()
    }
}

fn reject_all(_token: &str) -> bool {
    false
}

fn default_malformed_handler(_raw_header: Option<&str>) -> Response {
    (StatusCode::BAD_REQUEST, "Authorization header is malformed.").into_response()
}

fn default_failed_handler(_token: &str) -> Response {
    (StatusCode::UNAUTHORIZED, "Access denied.").into_response()
}

/// Shared handle to the process-wide configuration.
///
/// Cloning is cheap; all clones observe the same state. Reads and writes
/// go through short closures so no guard ever outlives a call site:
///
/// ```
/// use bearer_gate::SharedConfig;
///
/// let config = SharedConfig::new();
/// config.update(|c| c.jwt_issuer = Some("https://issuer.example.com".into()));
/// assert!(config.get(|c| c.jwt_issuer.is_some()));
/// ```
#[derive(Clone)]
pub struct SharedConfig(Arc<RwLock<GateConfig>>);

impl SharedConfig {
    /// Fresh defaults, with a [`PublicKeyProvider`] wired in as the
    /// default verification key source.
    pub fn new() -> Self {
        let config = Self(Arc::new(RwLock::new(GateConfig::new())));
        config.install_default_key_supplier();
        config
    }

    /// Read a value out of the configuration.
    pub fn get<T>(&self, read: impl FnOnce(&GateConfig) -> T) -> T {
        read(&self.0.read().expect(LOCK))
    }

    /// Mutate the configuration in place. Requests already in flight pick
    /// the new values up at their next read.
    pub fn update(&self, write: impl FnOnce(&mut GateConfig)) {
        write(&mut self.0.write().expect(LOCK));
    }

    /// Throw away all customization and return to the defaults.
    pub fn reset(&self) {
        self.update(|config| *config = GateConfig::new());
        self.install_default_key_supplier();
    }

    fn install_default_key_supplier(&self) {
        let provider = Arc::new(PublicKeyProvider::new(self.clone()));
        self.update(|config| config.jwt_verification_key = Some(provider));
    }

    /// Resolve the effective verification options at the moment of the
    /// call: the configured set, or the opinionated defaults derived from
    /// `jwt_issuer`/`jwt_beholder`.
    pub fn verification_options(&self) -> VerificationOptions {
        self.get(|config| {
            config.jwt_options.clone().unwrap_or_else(|| VerificationOptions {
                verify_issuer: config.jwt_issuer.is_some(),
                issuer: config.jwt_issuer.clone(),
                verify_audience: config.jwt_beholder.is_some(),
                audience: config.jwt_beholder.clone(),
                ..VerificationOptions::default()
            })
        })
    }

    /// Obtain the verification key from the configured supplier.
    pub async fn verification_key(&self) -> Result<DecodingKey, KeyError> {
        let supplier = self.get(|config| config.jwt_verification_key.clone());
        match supplier {
            Some(supplier) => supplier.verification_key().await,
            None => Err(KeyError::MissingUrl),
        }
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get(|config| f.debug_tuple("SharedConfig").field(config).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = SharedConfig::new();
        config.get(|c| {
            assert_eq!(c.rsa_public_key_url, None);
            assert!(!c.rsa_public_key_caching);
            assert_eq!(c.rsa_public_key_expiration, Duration::from_secs(3600));
            assert_eq!(c.jwt_issuer, None);
            assert_eq!(c.jwt_beholder, None);
            assert!(c.jwt_options.is_none());
            assert!(c.jwt_verification_key.is_some());
        });
    }

    #[test]
    fn default_options_are_opinionated() {
        let options = SharedConfig::new().verification_options();
        assert_eq!(options.algorithm, Algorithm::RS256);
        assert_eq!(options.expiry_leeway, 30);
        assert!(!options.verify_issuer);
        assert!(!options.verify_audience);
        assert!(!options.verify_issued_at);
    }

    #[test]
    fn issuer_and_beholder_enable_their_checks() {
        let config = SharedConfig::new();
        config.update(|c| {
            c.jwt_issuer = Some("issuer".into());
            c.jwt_beholder = Some("beholder".into());
        });

        let options = config.verification_options();
        assert!(options.verify_issuer);
        assert_eq!(options.issuer.as_deref(), Some("issuer"));
        assert!(options.verify_audience);
        assert_eq!(options.audience.as_deref(), Some("beholder"));
    }

    #[test]
    fn explicit_options_shadow_the_derived_ones() {
        let config = SharedConfig::new();
        config.update(|c| {
            c.jwt_issuer = Some("issuer".into());
            c.jwt_options = Some(VerificationOptions {
                expiry_leeway: 120,
                ..VerificationOptions::default()
            });
        });

        let options = config.verification_options();
        assert_eq!(options.expiry_leeway, 120);
        assert!(!options.verify_issuer);
    }

    #[test]
    fn reset_restores_the_defaults() {
        let config = SharedConfig::new();
        config.update(|c| {
            c.rsa_public_key_caching = true;
            c.jwt_issuer = Some("issuer".into());
        });

        config.reset();
        assert!(!config.get(|c| c.rsa_public_key_caching));
        assert_eq!(config.get(|c| c.jwt_issuer.clone()), None);
        assert!(config.get(|c| c.jwt_verification_key.is_some()));
    }

    #[test]
    fn clones_share_state() {
        let config = SharedConfig::new();
        let other = config.clone();
        config.update(|c| c.jwt_issuer = Some("issuer".into()));
        assert_eq!(other.get(|c| c.jwt_issuer.clone()).as_deref(), Some("issuer"));
    }

    #[tokio::test]
    async fn verification_key_without_url_is_a_configuration_fault() {
        let err = SharedConfig::new().verification_key().await.unwrap_err();
        assert!(matches!(err, KeyError::MissingUrl));
    }
}
