//! Error types shared across the crate.
//!
//! Malformed headers and rejected tokens are not errors here: the gate
//! recovers from both locally by invoking the configured responder. The
//! types below cover the faults that do cross an API boundary, namely
//! payload decoding and verification-key retrieval.

use thiserror::Error;

/// Failure to decode a token payload into claims.
///
/// Returned by [`crate::Jwt::decode`] and [`crate::Jwt::new`]. Signature
/// verification has its own (boolean) outcome and never produces this.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is not a dot-separated JWT")]
    Malformed,

    #[error("payload segment is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Failure to obtain the verification key.
///
/// These are deployment or infrastructure faults, not per-request
/// conditions, so they propagate to the caller instead of collapsing into
/// a verification result.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No public key URL was configured on the provider or the process
    /// defaults.
    #[error("no public key URL configured")]
    MissingUrl,

    #[error("fetching public key from `{url}` failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading public key from `{url}` failed: {source}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The fetched bytes are neither a PEM nor a DER encoded RSA public
    /// key. Never retried or swallowed.
    #[error("invalid public key material: {0}")]
    Parse(#[source] jsonwebtoken::errors::Error),
}
