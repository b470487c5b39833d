//! RSA public key retrieval and caching.
//!
//! One [`PublicKeyProvider`] is built at the composition root and lives for
//! the process. It reads its defaults (URL, caching, TTL) from the shared
//! configuration at every call, each overridable on the instance itself,
//! and keeps a single cache slot for the parsed key.

use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use url::Url;

use crate::config::SharedConfig;
use crate::error::KeyError;

const LOCK: &str = "public key lock poisoned";

/// Anything that can hand out the key used to check token signatures.
#[async_trait]
pub trait VerificationKeySupplier: Send + Sync {
    async fn verification_key(&self) -> Result<DecodingKey, KeyError>;
}

#[derive(Default)]
struct Overrides {
    url: Option<String>,
    caching: Option<bool>,
    expiration: Option<Duration>,
}

struct CachedKey {
    key: DecodingKey,
    expires_at: Instant,
}

/// Fetches the RSA public key from a local file or an HTTP(S) location,
/// optionally caching the parsed key for a configurable TTL.
///
/// The cache slot is replaced wholesale and no lock is held across the
/// fetch itself, so near-simultaneous misses may each fetch once; the last
/// writer wins.
pub struct PublicKeyProvider {
    config: SharedConfig,
    overrides: RwLock<Overrides>,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKey>>,
}

impl PublicKeyProvider {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            overrides: RwLock::new(Overrides::default()),
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// Swap in a custom HTTP client (timeouts, proxies and the like).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Override the key location for this instance.
    pub fn set_url(&self, url: impl Into<String>) {
        self.overrides.write().expect(LOCK).url = Some(url.into());
    }

    /// Override the caching flag for this instance.
    pub fn set_caching(&self, caching: bool) {
        self.overrides.write().expect(LOCK).caching = Some(caching);
    }

    /// Override the cache TTL for this instance.
    pub fn set_expiration(&self, expiration: Duration) {
        self.overrides.write().expect(LOCK).expiration = Some(expiration);
    }

    /// The effective key location: instance override, else the process
    /// default, resolved now.
    pub fn url(&self) -> Option<String> {
        self.overrides
            .read()
            .expect(LOCK)
            .url
            .clone()
            .or_else(|| self.config.get(|c| c.rsa_public_key_url.clone()))
    }

    /// The effective caching flag.
    pub fn caching(&self) -> bool {
        self.overrides
            .read()
            .expect(LOCK)
            .caching
            .unwrap_or_else(|| self.config.get(|c| c.rsa_public_key_caching))
    }

    /// The effective cache TTL.
    pub fn expiration(&self) -> Duration {
        self.overrides
            .read()
            .expect(LOCK)
            .expiration
            .unwrap_or_else(|| self.config.get(|c| c.rsa_public_key_expiration))
    }

    /// Whether the effective URL points at a remote server. Anything
    /// without an `http`/`https` scheme is treated as a local path.
    pub fn is_remote(&self) -> bool {
        self.url().is_some_and(|url| is_remote_url(&url))
    }

    /// Fetch the encoded (PEM or DER) key bytes from the configured
    /// location. Fails with [`KeyError::MissingUrl`] when no location is
    /// configured anywhere.
    pub async fn fetch_raw(&self) -> Result<Vec<u8>, KeyError> {
        let url = self.url().ok_or(KeyError::MissingUrl)?;

        if is_remote_url(&url) {
            tracing::debug!(%url, "fetching public key from remote");
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|source| KeyError::Fetch {
                    url: url.clone(),
                    source,
                })?;
            let body = response
                .bytes()
                .await
                .map_err(|source| KeyError::Fetch { url, source })?;
            Ok(body.to_vec())
        } else {
            tracing::debug!(path = %url, "reading public key from file");
            tokio::fs::read(&url)
                .await
                .map_err(|source| KeyError::Read { url, source })
        }
    }

    /// Fetch and parse the verification key, honoring the caching
    /// settings. A live cache entry is returned without touching the
    /// source; on miss or expiry the key is fetched, parsed, and stored
    /// with the effective TTL.
    pub async fn fetch(&self) -> Result<DecodingKey, KeyError> {
        if !self.caching() {
            let bytes = self.fetch_raw().await?;
            return parse_key(&bytes);
        }

        {
            let slot = self.cache.read().expect(LOCK);
            if let Some(cached) = slot.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.key.clone());
                }
            }
        }

        let bytes = self.fetch_raw().await?;
        let key = parse_key(&bytes)?;
        let entry = CachedKey {
            key: key.clone(),
            expires_at: Instant::now() + self.expiration(),
        };
        *self.cache.write().expect(LOCK) = Some(entry);
        Ok(key)
    }
}

#[async_trait]
impl VerificationKeySupplier for PublicKeyProvider {
    async fn verification_key(&self) -> Result<DecodingKey, KeyError> {
        self.fetch().await
    }
}

impl fmt::Debug for PublicKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material is not printable
        f.debug_struct("PublicKeyProvider")
            .field("url", &self.url())
            .field("caching", &self.caching())
            .field("expiration", &self.expiration())
            .finish_non_exhaustive()
    }
}

fn is_remote_url(url: &str) -> bool {
    matches!(Url::parse(url), Ok(parsed) if matches!(parsed.scheme(), "http" | "https"))
}

fn parse_key(bytes: &[u8]) -> Result<DecodingKey, KeyError> {
    if bytes.starts_with(b"-----BEGIN") {
        return DecodingKey::from_rsa_pem(bytes).map_err(KeyError::Parse);
    }
    // No armor: treat the bytes as DER. The backend validates the key
    // material on first use.
    Ok(DecodingKey::from_rsa_der(bytes))
}
