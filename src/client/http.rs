//! HTTP client and request executor.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{Credentials, TokenIssuer};
use crate::error::classify;
use crate::models::Document;
use crate::{Error, Result};

use super::config::ClientConfig;
use super::request::Request;

/// The main client for the wrapped service.
///
/// The client owns a [`TokenIssuer`] and a pooled HTTP connection. Cloning
/// is cheap; clones share the token cache and the connection pool.
///
/// # Example
///
/// ```no_run
/// use connect_core::{ConnectClient, Credentials, Request};
///
/// # async fn example() -> connect_core::Result<()> {
/// let client = ConnectClient::new(Credentials::from_env()?)?;
///
/// // One page, decoded into the envelope
/// let page = client
///     .fetch::<Vec<serde_json::Value>>(Request::get("/v1/apps").query("limit", "5"))
///     .await?;
///
/// // Every page, up to 10
/// let apps: Vec<serde_json::Value> = client.collect_all(Request::get("/v1/apps"), 10).await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) issuer: TokenIssuer,
    pub(crate) config: ClientConfig,
}

impl ConnectClient {
    /// Create a client with default configuration.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(credentials, ClientConfig::default())
    }

    /// Create a client from the `ASC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Credentials::from_env()?)
    }

    /// Create a client with custom configuration.
    pub fn with_config(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        let issuer = TokenIssuer::new(credentials, config.token.clone())?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                issuer,
                config,
            }),
        })
    }

    /// Perform one call and return the raw response body.
    ///
    /// A `204 No Content` yields an empty vector. A `401` on the first attempt
    /// is retried once with a freshly minted token; a `429` is retried after
    /// the server's `Retry-After` delay while fewer than
    /// [`RetryConfig::max_rate_limit_retries`](crate::RetryConfig) attempts
    /// have been made. Both retries count toward the same attempt number.
    /// Every other failure is returned on first occurrence.
    pub async fn execute(&self, request: &Request) -> Result<Vec<u8>> {
        self.inner.execute(request).await
    }

    /// Perform one call and return the body as UTF-8 text.
    pub async fn execute_text(&self, request: &Request) -> Result<String> {
        let body = self.inner.execute(request).await?;
        String::from_utf8(body)
            .map_err(|e| Error::InvalidResponse(format!("response is not UTF-8: {e}")))
    }

    /// Perform one call and decode the response envelope.
    ///
    /// An empty body (such as a `204`) cannot be decoded and is reported as
    /// [`Error::InvalidResponse`].
    pub async fn fetch<T: DeserializeOwned>(&self, request: Request) -> Result<Document<T>> {
        self.inner.fetch(&request).await
    }

    /// The token issuer shared by every request of this client.
    pub fn issuer(&self) -> &TokenIssuer {
        &self.inner.issuer
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl ClientInner {
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, request: &Request) -> Result<Document<T>> {
        let body = self.execute(request).await?;
        if body.is_empty() {
            return Err(Error::InvalidResponse(
                "empty response body where a document was expected".to_string(),
            ));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Execute one logical call, applying the auth and rate-limit retry policy.
    ///
    /// Both policies draw on one `attempt` counter: a 401 is retried only
    /// while `attempt < max_auth_retries`, a 429 only while
    /// `attempt < max_rate_limit_retries`, and every retry increments it.
    pub(crate) async fn execute(&self, request: &Request) -> Result<Vec<u8>> {
        let url = request.url(&self.config.base_url)?;
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            let token = self.issuer.token().await?;
            debug!(method = %request.method(), url = %url, attempt, "Sending request");

            let mut builder = self
                .http
                .request(request.method().clone(), url.clone())
                .headers(build_headers(&token)?);
            if let Some(body) = request.body_bytes() {
                builder = builder.body(body.to_vec());
            }
            let response = builder.send().await?;
            let status = response.status();

            match status {
                StatusCode::NO_CONTENT => return Ok(Vec::new()),
                status if status.is_success() => return Ok(response.bytes().await?.to_vec()),
                StatusCode::UNAUTHORIZED if attempt < retry.max_auth_retries => {
                    attempt += 1;
                    warn!(url = %url, attempt, "Unauthorized; retrying with a fresh token");
                    self.issuer.invalidate().await;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let header = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok());
                    let wait = retry.retry_after(header);

                    if attempt >= retry.max_rate_limit_retries {
                        warn!(url = %url, attempt, "Rate limit retries exhausted");
                        return Err(Error::RateLimited {
                            retry_after: Some(wait),
                        });
                    }

                    attempt += 1;
                    warn!(
                        url = %url,
                        wait_secs = wait.as_secs_f64(),
                        attempt,
                        "Rate limited; backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                status => {
                    let body = response.bytes().await?;
                    let err = classify(status.as_u16(), &body);
                    debug!(url = %url, status = status.as_u16(), error = %err, "Request failed");
                    return Err(err);
                }
            }
        }
    }
}

fn build_headers(token: &SecretString) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| Error::Signing("token is not a valid header value".to_string()))?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(headers)
}

impl Clone for ConnectClient {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectClient")
            .field("config", &self.inner.config)
            .field("issuer", &self.inner.issuer)
            .finish()
    }
}
