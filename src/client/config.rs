//! Client configuration options.

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use crate::{Error, Result};

/// Default host every relative request target is resolved against.
pub const DEFAULT_BASE_URL: &str = "https://api.appstoreconnect.apple.com";

/// Default `aud` claim of issued tokens.
pub const DEFAULT_AUDIENCE: &str = "appstoreconnect-v1";

/// Configuration for the connect client.
///
/// # Example
///
/// ```
/// use connect_core::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_secs(60))
///     .with_user_agent("my-app/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL relative request targets are appended to
    pub base_url: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Bearer token configuration
    pub token: TokenConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("connect-core/{} (Rust)", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default(),
            token: TokenConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the client at a different host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the token configuration.
    pub fn with_token(mut self, token: TokenConfig) -> Self {
        self.token = token;
        self
    }
}

/// Retry policy of the request executor.
///
/// Only two statuses are ever retried: `401` (the token is assumed stale,
/// so it is re-minted) and `429` (the server's `Retry-After` is honoured).
/// Every other status fails on first occurrence.
///
/// Both limits are compared against the same attempt number, which every
/// retry of either kind advances. With the defaults a `401` is retried only
/// on the first attempt, so a `401` that follows a `429` is returned.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// A 401 is retried while the attempt number is below this
    pub max_auth_retries: u32,
    /// A 429 is retried while the attempt number is below this
    pub max_rate_limit_retries: u32,
    /// Wait used when a 429 carries no usable `Retry-After`
    pub default_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_auth_retries: 1,
            max_rate_limit_retries: 3,
            default_retry_after: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_auth_retries: 0,
            max_rate_limit_retries: 0,
            ..Default::default()
        }
    }

    /// Set the number of retries after a 401.
    pub fn with_max_auth_retries(mut self, max: u32) -> Self {
        self.max_auth_retries = max;
        self
    }

    /// Set the number of retries after a 429.
    pub fn with_max_rate_limit_retries(mut self, max: u32) -> Self {
        self.max_rate_limit_retries = max;
        self
    }

    /// Set the fallback wait for a 429 without `Retry-After`.
    pub fn with_default_retry_after(mut self, duration: Duration) -> Self {
        self.default_retry_after = duration;
        self
    }

    /// Resolve the wait for a 429 from its `Retry-After` header value.
    ///
    /// The header is read as a (possibly fractional) number of seconds.
    /// Missing, negative, or unparseable values fall back to
    /// [`default_retry_after`](Self::default_retry_after).
    pub fn retry_after(&self, header: Option<&str>) -> Duration {
        header
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_retry_after)
    }
}

/// Lifetime and claims of issued bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// How long a minted token is valid
    pub lifetime: Duration,
    /// A cached token is replaced once it is this close to expiry
    pub refresh_buffer: Duration,
    /// The `aud` claim
    pub audience: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(20 * 60),
            refresh_buffer: Duration::from_secs(2 * 60),
            audience: DEFAULT_AUDIENCE.to_string(),
        }
    }
}

impl TokenConfig {
    /// Set the token lifetime.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the refresh buffer.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Set the `aud` claim.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Check that the buffer is strictly smaller than a non-zero lifetime,
    /// and that an expiry of now plus the lifetime can be represented.
    pub fn validate(&self) -> Result<()> {
        if self.lifetime.as_secs() == 0 {
            return Err(Error::Config(
                "token lifetime must be at least one second".to_string(),
            ));
        }
        let representable = TimeDelta::from_std(self.lifetime)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .is_some();
        if !representable {
            return Err(Error::Config(format!(
                "token lifetime ({:?}) is out of range",
                self.lifetime
            )));
        }
        if self.refresh_buffer >= self.lifetime {
            return Err(Error::Config(format!(
                "refresh buffer ({:?}) must be smaller than token lifetime ({:?})",
                self.refresh_buffer, self.lifetime
            )));
        }
        Ok(())
    }
}
