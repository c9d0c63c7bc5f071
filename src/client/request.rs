//! Request descriptors built by call-sites and consumed by the executor.

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::{Error, Result};

/// One HTTP call: method, target, query and optional JSON body.
///
/// The target is either a path relative to the configured base URL
/// (`/v1/apps`) or an absolute `http(s)` URL, such as a `links.next`
/// value taken from a previous response.
///
/// # Example
///
/// ```
/// use connect_core::Request;
///
/// let request = Request::get("/v1/apps")
///     .query("limit", "200")
///     .query("fields[apps]", "name,bundleId");
/// assert_eq!(request.target(), "/v1/apps");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    target: String,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request with an arbitrary method.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `GET` request.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    /// A `POST` request.
    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    /// A `PATCH` request.
    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(Method::PATCH, target)
    }

    /// A `DELETE` request.
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    /// Append a query parameter. Parameters keep their insertion order.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach raw body bytes.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// An unencodable body is reported as [`Error::InvalidResponse`], the
    /// codec failure kind.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::InvalidResponse(format!("cannot encode request body: {e}")))?;
        Ok(self.body(bytes))
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path or absolute URL, without query parameters added by [`query`](Self::query).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The body bytes, if any.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Resolve the full URL against `base_url`.
    pub fn url(&self, base_url: &str) -> Result<Url> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(Error::InvalidUrl("empty request target".to_string()));
        }

        let mut url = if is_absolute(target) {
            Url::parse(target)?
        } else if target.contains("://") {
            return Err(Error::InvalidUrl(format!("unsupported URL scheme: {target}")));
        } else {
            let base = base_url.trim_end_matches('/');
            let path = target.trim_start_matches('/');
            Url::parse(&format!("{base}/{path}"))?
        };

        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(Error::InvalidUrl(format!("not a network URL: {url}")));
        }

        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

fn is_absolute(target: &str) -> bool {
    let lower = target.get(..8).unwrap_or(target).to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Unwrap a required call-site input or fail with [`Error::MissingParameter`].
///
/// # Example
///
/// ```
/// use connect_core::{require, Error};
///
/// let app_id: Option<&str> = None;
/// let err = require("app_id", app_id).unwrap_err();
/// assert!(matches!(err, Error::MissingParameter(name) if name == "app_id"));
/// ```
pub fn require<T>(name: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| Error::MissingParameter(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.example.com";

    #[test]
    fn test_relative_target_joins_base() {
        let url = Request::get("/v1/apps").url(BASE).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/apps");

        let url = Request::get("v1/apps").url("https://api.example.com/").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/apps");
    }

    #[test]
    fn test_query_parameters_are_encoded_in_order() {
        let url = Request::get("/v1/builds")
            .query("filter[app]", "123")
            .query("limit", "50")
            .url(BASE)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/builds?filter%5Bapp%5D=123&limit=50"
        );
    }

    #[test]
    fn test_absolute_target_ignores_base() {
        let next = "https://api.example.com/v1/apps?cursor=AQ&limit=2";
        let url = Request::get(next).url("https://other.example.org").unwrap();
        assert_eq!(url.as_str(), next);
    }

    #[test]
    fn test_invalid_targets() {
        assert!(matches!(Request::get("").url(BASE), Err(Error::InvalidUrl(_))));
        assert!(matches!(
            Request::get("ftp://files.example.com/x").url(BASE),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(Request::get("https://").url(BASE), Err(Error::InvalidUrl(_))));
        assert!(matches!(Request::get("/v1/apps").url("not a base"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_json_body() {
        let request = Request::patch("/v1/apps/1")
            .json(&serde_json::json!({"data": {"type": "apps", "id": "1"}}))
            .unwrap();
        assert_eq!(request.method(), &Method::PATCH);
        let body: serde_json::Value = serde_json::from_slice(request.body_bytes().unwrap()).unwrap();
        assert_eq!(body["data"]["id"], "1");
    }

    #[test]
    fn test_require() {
        assert_eq!(require("id", Some(5)).unwrap(), 5);
        assert!(matches!(
            require::<u32>("id", None),
            Err(Error::MissingParameter(name)) if name == "id"
        ));
    }
}
