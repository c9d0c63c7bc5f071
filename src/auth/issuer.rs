//! Bearer token issuing and caching.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::Signature;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::Credentials;
use crate::client::TokenConfig;
use crate::{Error, Result};

/// Issues ES256 bearer tokens and caches the current one.
///
/// # Thread Safety
///
/// `TokenIssuer` is meant to be shared (usually behind an `Arc`) by every
/// in-flight request. A cached token that is not yet inside the refresh
/// buffer is served under a read lock only. When the token is missing or
/// stale, callers queue on a refresh gate: the first one signs, stores and
/// releases; the rest find the new token in the cache. Concurrent callers
/// therefore trigger exactly one signing operation between them, and
/// signing never holds the cache lock.
pub struct TokenIssuer {
    credentials: Credentials,
    config: TokenConfig,
    cache: RwLock<Option<CachedToken>>,
    refresh_gate: Mutex<()>,
    minted: AtomicU64,
}

struct CachedToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl TokenIssuer {
    /// Create an issuer. Fails if the token configuration is inconsistent.
    pub fn new(credentials: Credentials, config: TokenConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            credentials,
            config,
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            minted: AtomicU64::new(0),
        })
    }

    /// Get a currently valid token, minting one if needed.
    ///
    /// The cached token is returned while `now < expires_at - refresh_buffer`.
    pub async fn token(&self) -> Result<SecretString> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;

        // Whoever held the gate before us may already have refreshed.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let token = self.mint()?;
        let value = token.value.clone();
        *self.cache.write().await = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next [`token`](Self::token) call mints
    /// a new one.
    ///
    /// A mint already in progress is not cancelled; its result is still
    /// handed to the callers waiting on it.
    pub async fn invalidate(&self) {
        let previous = self.cache.write().await.take();
        if let Some(previous) = previous {
            debug!(
                key_id = %self.credentials.key_id(),
                expires_at = %previous.expires_at,
                "Invalidated cached token"
            );
        }
    }

    /// Expiry of the cached token, if one is cached.
    pub async fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        self.cache.read().await.as_ref().map(|token| token.expires_at)
    }

    /// Number of signing operations performed so far.
    pub fn tokens_minted(&self) -> u64 {
        self.minted.load(Ordering::Relaxed)
    }

    /// The credentials tokens are signed with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn fresh_token(&self) -> Option<SecretString> {
        let refresh_buffer = to_chrono(self.config.refresh_buffer).ok()?;
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|token| {
                token
                    .expires_at
                    .checked_sub_signed(refresh_buffer)
                    .is_some_and(|refresh_at| Utc::now() < refresh_at)
            })
            .map(|token| token.value.clone())
    }

    fn mint(&self) -> Result<CachedToken> {
        let now = Utc::now();
        let lifetime = to_chrono(self.config.lifetime)?;
        let issued_at = now.timestamp();
        let expires_at = now.checked_add_signed(lifetime).ok_or_else(|| {
            Error::Config(format!(
                "token lifetime ({:?}) is out of range",
                self.config.lifetime
            ))
        })?;

        let header = BTreeMap::from([
            ("alg", Value::from("ES256")),
            ("kid", Value::from(self.credentials.key_id())),
            ("typ", Value::from("JWT")),
        ]);
        let claims = BTreeMap::from([
            ("aud", Value::from(self.config.audience.as_str())),
            ("exp", Value::from(issued_at + lifetime.num_seconds())),
            ("iat", Value::from(issued_at)),
            ("iss", Value::from(self.credentials.issuer_id())),
        ]);

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature: Signature = self
            .credentials
            .signing_key()
            .try_sign(signing_input.as_bytes())
            .map_err(|e| Error::Signing(format!("ES256 signing failed: {e}")))?;
        let token = format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );

        self.minted.fetch_add(1, Ordering::Relaxed);
        debug!(
            key_id = %self.credentials.key_id(),
            expires_at = %expires_at,
            "Minted bearer token"
        );

        Ok(CachedToken {
            value: SecretString::from(token),
            expires_at,
        })
    }
}

fn encode_segment(object: &BTreeMap<&str, Value>) -> Result<String> {
    let json = serde_json::to_vec(object)
        .map_err(|e| Error::Signing(format!("cannot encode token segment: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn to_chrono(duration: std::time::Duration) -> Result<Duration> {
    Duration::from_std(duration)
        .map_err(|_| Error::Config(format!("duration ({duration:?}) is out of range")))
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .field("cached_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use p256::ecdsa::signature::Verifier;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::auth::credentials::tests::test_credentials;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(test_credentials(), TokenConfig::default()).unwrap()
    }

    fn decode_segment(segment: &str) -> Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_token_is_compact_es256_jwt() {
        let issuer = issuer();
        let token = issuer.token().await.unwrap();
        let token = token.expose_secret().to_string();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(!token.contains('='));

        let header = decode_segment(parts[0]);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["kid"], "KEY123");
        assert_eq!(header["typ"], "JWT");

        let claims = decode_segment(parts[1]);
        assert_eq!(claims["iss"], "issuer-abc");
        assert_eq!(claims["aud"], "appstoreconnect-v1");
        let iat = claims["iat"].as_i64().unwrap();
        let exp = claims["exp"].as_i64().unwrap();
        assert_eq!(exp - iat, 20 * 60);

        // Keys are emitted in sorted order.
        let header_json = String::from_utf8(URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header_json, r#"{"alg":"ES256","kid":"KEY123","typ":"JWT"}"#);
        let claims_json = String::from_utf8(URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert!(claims_json.starts_with(r#"{"aud":"appstoreconnect-v1","exp":"#));

        let signature_bytes = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        assert_eq!(signature_bytes.len(), 64);
        let signature = Signature::from_slice(&signature_bytes).unwrap();
        let verifying_key = test_credentials().signing_key().verifying_key().clone();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        assert!(verifying_key.verify(signing_input.as_bytes(), &signature).is_ok());
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let issuer = issuer();
        let first = issuer.token().await.unwrap();
        let second = issuer.token().await.unwrap();
        assert_eq!(first.expose_secret(), second.expose_secret());
        assert_eq!(issuer.tokens_minted(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_later_token() {
        let issuer = issuer();
        issuer.token().await.unwrap();
        let before = issuer.cached_expiry().await.unwrap();

        issuer.invalidate().await;
        assert!(issuer.cached_expiry().await.is_none());

        issuer.token().await.unwrap();
        let after = issuer.cached_expiry().await.unwrap();
        assert!(after > before);
        assert_eq!(issuer.tokens_minted(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_on_empty_cache_is_harmless() {
        let issuer = issuer();
        issuer.invalidate().await;
        issuer.token().await.unwrap();
        assert_eq!(issuer.tokens_minted(), 1);
    }

    #[tokio::test]
    async fn test_token_inside_refresh_buffer_is_replaced() {
        // Tokens go stale one second after they are minted.
        let config = TokenConfig::default()
            .with_lifetime(std::time::Duration::from_secs(60))
            .with_refresh_buffer(std::time::Duration::from_secs(59));
        let issuer = TokenIssuer::new(test_credentials(), config).unwrap();

        issuer.token().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        issuer.token().await.unwrap();
        assert_eq!(issuer.tokens_minted(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_mint() {
        let issuer = Arc::new(issuer());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let issuer = issuer.clone();
                tokio::spawn(async move {
                    issuer.token().await.unwrap().expose_secret().to_string()
                })
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }

        assert_eq!(issuer.tokens_minted(), 1);
        assert!(tokens.iter().all(|token| token == &tokens[0]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh_of_stale_token() {
        let config = TokenConfig::default()
            .with_lifetime(std::time::Duration::from_secs(60))
            .with_refresh_buffer(std::time::Duration::from_secs(59));
        let issuer = Arc::new(TokenIssuer::new(test_credentials(), config).unwrap());

        let stale = issuer.token().await.unwrap().expose_secret().to_string();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let issuer = issuer.clone();
                tokio::spawn(async move {
                    issuer
                        .token()
                        .await
                        .map(|token| token.expose_secret().to_string())
                })
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(issuer.tokens_minted(), 2);
        assert!(tokens.iter().all(|token| token == &tokens[0]));
        assert_ne!(tokens[0], stale);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invalidate_racing_with_callers() {
        const CALLERS: usize = 32;
        const INVALIDATIONS: u64 = 8;

        let issuer = Arc::new(issuer());
        issuer.token().await.unwrap();

        let mut callers = Vec::new();
        let mut invalidators = Vec::new();
        for i in 0..CALLERS {
            let caller = issuer.clone();
            callers.push(tokio::spawn(async move { caller.token().await }));
            if (i as u64) < INVALIDATIONS {
                let issuer = issuer.clone();
                invalidators.push(tokio::spawn(async move { issuer.invalidate().await }));
            }
        }

        for handle in callers {
            assert!(handle.await.unwrap().is_ok());
        }
        for handle in invalidators {
            handle.await.unwrap();
        }

        // One initial mint, then at most one per invalidation.
        let minted = issuer.tokens_minted();
        assert!(minted >= 1);
        assert!(minted <= 1 + INVALIDATIONS, "minted {minted} tokens");

        issuer.token().await.unwrap();
        assert!(issuer.cached_expiry().await.is_some());
        assert!(issuer.tokens_minted() <= 2 + INVALIDATIONS);
    }

    #[test]
    fn test_rejects_unrepresentable_lifetime() {
        let config = TokenConfig::default().with_lifetime(std::time::Duration::from_secs(u64::MAX));
        let err = TokenIssuer::new(test_credentials(), config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_buffer_not_smaller_than_lifetime() {
        let config = TokenConfig::default()
            .with_lifetime(std::time::Duration::from_secs(60))
            .with_refresh_buffer(std::time::Duration::from_secs(60));
        let err = TokenIssuer::new(test_credentials(), config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug_str = format!("{:?}", issuer());
        assert!(debug_str.contains("REDACTED"));
    }
}
