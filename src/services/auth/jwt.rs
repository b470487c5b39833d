//! JSON Web Token model: unverified payload decoding plus strict,
//! opinionated verification.
//!
//! A [`Jwt`] is created fresh per token. It keeps the raw string verbatim
//! for diagnostics, the decoded claims, and optional per-instance
//! overrides for the verification key and options. Anything not overridden
//! is resolved from the process configuration at the moment of the call.

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;

use crate::config::SharedConfig;
use crate::error::{DecodeError, KeyError};
use crate::middleware::bearer_auth::Authenticator;

/// The decoded JSON payload of a token.
pub type Claims = serde_json::Map<String, Value>;

/// Options for one verification call. Immutable once built.
#[derive(Debug, Clone)]
pub struct VerificationOptions {
    pub algorithm: Algorithm,

    /// Tolerance, in seconds, applied to the expiry check.
    pub expiry_leeway: u64,

    pub verify_issuer: bool,
    pub issuer: Option<String>,

    pub verify_audience: bool,
    pub audience: Option<String>,

    /// The verification backend performs no issued-at validation, so this
    /// flag is carried for completeness but always treated as disabled.
    /// Known limitation; do not rely on `iat` being checked.
    pub verify_issued_at: bool,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::RS256,
            expiry_leeway: 30,
            verify_issuer: false,
            issuer: None,
            verify_audience: false,
            audience: None,
            verify_issued_at: false,
        }
    }
}

/// Why a verification attempt failed.
///
/// Only the boolean outcome is public; this stays internal so logs and
/// tests can still tell the causes apart.
#[derive(Debug, thiserror::Error)]
pub(crate) enum VerifyError {
    #[error("token could not be decoded")]
    Decode,
    #[error("signature verification failed")]
    Signature,
    #[error("token is expired")]
    Expired,
    #[error("token is not yet valid")]
    Premature,
    #[error("token algorithm mismatch")]
    Algorithm,
    #[error("issuer mismatch")]
    Issuer,
    #[error("audience mismatch")]
    Audience,
    #[error("subject mismatch")]
    Subject,
    #[error("missing required claim `{0}`")]
    MissingClaim(String),
    #[error("verification failed: {0}")]
    Other(jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => return Self::Signature,
            ErrorKind::ExpiredSignature => return Self::Expired,
            ErrorKind::ImmatureSignature => return Self::Premature,
            ErrorKind::InvalidAlgorithm => return Self::Algorithm,
            ErrorKind::InvalidIssuer => return Self::Issuer,
            ErrorKind::InvalidAudience => return Self::Audience,
            ErrorKind::InvalidSubject => return Self::Subject,
            ErrorKind::MissingRequiredClaim(name) => return Self::MissingClaim(name.clone()),
            ErrorKind::InvalidToken => return Self::Decode,
            _ => {}
        }
        Self::Other(err)
    }
}

/// A single bearer token: the raw string plus its decoded claims.
#[derive(Clone)]
pub struct Jwt {
    token: String,
    claims: Claims,
    config: SharedConfig,
    verification_key: Option<DecodingKey>,
    options: Option<VerificationOptions>,
}

impl fmt::Debug for Jwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material is not printable
        f.debug_struct("Jwt")
            .field("token", &self.token)
            .field("claims", &self.claims)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Jwt {
    /// Wrap a raw token, decoding its payload (without verification).
    pub fn new(token: &str, config: SharedConfig) -> Result<Self, DecodeError> {
        let claims = Self::decode(token)?;
        Ok(Self {
            token: token.to_owned(),
            claims,
            config,
            verification_key: None,
            options: None,
        })
    }

    /// Decode the payload segment into claims without checking the
    /// signature. A missing signature segment is tolerated here; only the
    /// gate's structural validation insists on three segments.
    pub fn decode(token: &str) -> Result<Claims, DecodeError> {
        let segments: Vec<&str> = token.split('.').collect();
        if !(2..=3).contains(&segments.len()) {
            return Err(DecodeError::Malformed);
        }

        let payload = decode_segment(segments[1])?;
        match serde_json::from_slice::<Value>(&payload)? {
            Value::Object(claims) => Ok(claims),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    /// The raw token exactly as received. Never changes after construction.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Override the verification key for this instance. Once set, the
    /// process-wide supplier is never consulted again for this token.
    pub fn set_verification_key(&mut self, key: DecodingKey) {
        self.verification_key = Some(key);
    }

    /// Override the verification options for this instance.
    pub fn set_options(&mut self, options: VerificationOptions) {
        self.options = Some(options);
    }

    /// Whether the `typ` claim says this is an access token.
    pub fn is_access_token(&self) -> bool {
        self.claim("typ").and_then(Value::as_str) == Some("access")
    }

    /// Whether the `typ` claim says this is a refresh token.
    pub fn is_refresh_token(&self) -> bool {
        self.claim("typ").and_then(Value::as_str) == Some("refresh")
    }

    /// The expiry instant from the `exp` claim, when present. A fractional
    /// timestamp is truncated to whole seconds.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.claim("exp")?;
        exp.as_i64()
            .or_else(|| exp.as_f64().map(|secs| secs.trunc() as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Verify this token with the late-bound key and options: instance
    /// overrides first, the process configuration otherwise.
    ///
    /// `Ok(false)` covers every verification failure. `Err` is reserved
    /// for key acquisition faults, which are setup defects rather than
    /// properties of the token.
    pub async fn verify(&self) -> Result<bool, KeyError> {
        let key = match &self.verification_key {
            Some(key) => key.clone(),
            None => self.config.verification_key().await?,
        };
        let options = self
            .options
            .clone()
            .unwrap_or_else(|| self.config.verification_options());

        Ok(self.verify_with(&key, &options))
    }

    /// Verify this token against an explicit key and option set.
    ///
    /// Every failure cause collapses into `false`: bad signature, expiry
    /// beyond leeway, algorithm mismatch, premature token, issuer or
    /// audience mismatch, undecodable token. Never panics.
    pub fn verify_with(&self, key: &DecodingKey, options: &VerificationOptions) -> bool {
        match self.check(key, options) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(error = ?err, "token verification failed");
                false
            }
        }
    }

    pub(crate) fn check(
        &self,
        key: &DecodingKey,
        options: &VerificationOptions,
    ) -> Result<(), VerifyError> {
        let validation = build_validation(options);
        jsonwebtoken::decode::<Claims>(&self.token, key, &validation)?;
        Ok(())
    }
}

fn build_validation(options: &VerificationOptions) -> Validation {
    let mut validation = Validation::new(options.algorithm);
    validation.leeway = options.expiry_leeway;
    // An `exp` claim is enforced when present, but its absence alone does
    // not fail a token.
    validation.required_spec_claims.clear();
    if options.verify_issuer {
        if let Some(issuer) = &options.issuer {
            validation.set_issuer(&[issuer]);
        }
    }
    if options.verify_audience {
        if let Some(audience) = &options.audience {
            validation.set_audience(&[audience]);
        }
    }
    // No issued-at handling: the backend never validates `iat`.
    validation
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    // Tokens in the wild are unpadded, but some producers pad anyway.
    URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| URL_SAFE.decode(segment))
        .map_err(DecodeError::Base64)
}

/// An [`Authenticator`] running the full opinionated verification: decode
/// the token, resolve key and options from the configuration, check the
/// signature and claims.
///
/// Key supply faults are logged and collapse into a rejection at this
/// seam, since the gate only understands accept/reject.
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    config: SharedConfig,
}

impl JwtAuthenticator {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> bool {
        let jwt = match Jwt::new(token, self.config.clone()) {
            Ok(jwt) => jwt,
            Err(err) => {
                tracing::debug!(error = ?err, "token payload could not be decoded");
                return false;
            }
        };

        match jwt.verify().await {
            Ok(valid) => valid,
            Err(err) => {
                tracing::warn!(error = ?err, "verification key unavailable");
                false
            }
        }
    }
}
