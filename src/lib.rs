//! JWT bearer authentication middleware for axum.
//!
//! Every request to a gated router must carry `Authorization: Bearer
//! <token>` with a structurally valid JWT. The gate validates the header
//! shape, hands the raw token to a pluggable [`Authenticator`] for the
//! actual trust decision, and attaches the token (raw and decoded) to the
//! request extensions for downstream handlers. Requests that fail either
//! step are answered by pluggable responders instead of reaching the
//! application.
//!
//! What the gate deliberately does not do: credential issuance, user
//! lookup, session management. Anything beyond the structural and
//! cryptographic checks lives in your authenticator.
//!
//! # Getting started
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use bearer_gate::{middleware::bearer_auth, BearerGate, JwtAuthenticator, SharedConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SharedConfig::new();
//!     config.update(|c| {
//!         c.rsa_public_key_url = Some("https://idp.example.com/rsa.pub".into());
//!         c.rsa_public_key_caching = true;
//!         c.jwt_issuer = Some("https://idp.example.com".into());
//!         c.jwt_beholder = Some("my-service".into());
//!     });
//!
//!     let gate = BearerGate::new(config.clone())
//!         .with_authenticator(JwtAuthenticator::new(config));
//!
//!     let app = bearer_auth::apply(
//!         Router::new().route("/", get(|| async { "gated" })),
//!         gate,
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! # Reading the token downstream
//!
//! ```no_run
//! use axum::Extension;
//! use bearer_gate::{DecodedToken, OriginalToken};
//!
//! async fn handler(
//!     Extension(OriginalToken(raw)): Extension<OriginalToken>,
//!     Extension(DecodedToken(decoded)): Extension<DecodedToken>,
//! ) -> String {
//!     match decoded {
//!         Some(jwt) if jwt.is_access_token() => format!("access token {raw}"),
//!         _ => format!("opaque token {raw}"),
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod services;

pub use config::{GateConfig, SharedConfig};
pub use error::{DecodeError, KeyError};
pub use middleware::bearer_auth::{
    apply, Authenticator, BearerGate, DecodedToken, FailedResponder, MalformedResponder,
    OriginalToken,
};
pub use services::auth::{
    Claims, Jwt, JwtAuthenticator, PublicKeyProvider, VerificationKeySupplier,
    VerificationOptions,
};
