//! # connect-core
//!
//! The credentialed core of a client for a JSON:API style REST service.
//!
//! The crate does three things and leaves everything resource-specific to
//! its callers:
//!
//! - **Authentication**: signs short-lived ES256 bearer tokens from a P-256
//!   private key, caches the current one, and refreshes it before it expires.
//!   Concurrent requests share a single signing operation.
//! - **Execution**: performs one HTTP call with the token attached, retries
//!   once on `401` with a fresh token, backs off on `429` as directed by
//!   `Retry-After`, and classifies every other failure into [`Error`].
//! - **Pagination**: follows `links.next` across pages, preserving item
//!   order, up to a caller-supplied page ceiling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use connect_core::{ConnectClient, Credentials, Request};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct App {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> connect_core::Result<()> {
//!     // ASC_KEY_ID, ASC_ISSUER_ID and ASC_PRIVATE_KEY_PATH
//!     let client = ConnectClient::new(Credentials::from_env()?)?;
//!
//!     // Every app, across at most 10 pages
//!     let apps: Vec<App> = client
//!         .collect_all(Request::get("/v1/apps").query("limit", "200"), 10)
//!         .await?;
//!     println!("Found {} apps", apps.len());
//!
//!     // A single resource
//!     if let Some(app) = apps.first() {
//!         let doc = client
//!             .fetch::<App>(Request::get(format!("/v1/apps/{}", app.id)))
//!             .await?;
//!         println!("{:?}", doc.data);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! ```rust,no_run
//! use connect_core::{ConnectClient, Error, Request};
//!
//! # async fn example(client: ConnectClient) {
//! match client.execute(&Request::delete("/v1/betaTesters/123")).await {
//!     Ok(_) => println!("deleted"),
//!     Err(Error::Api { status, message, .. }) => eprintln!("{status}: {message}"),
//!     Err(Error::RateLimited { .. }) => eprintln!("try again later"),
//!     Err(other) => eprintln!("{other}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

// Re-export primary types at crate root for convenience
pub use auth::{Credentials, TokenIssuer};
pub use client::{
    require, ClientConfig, Collected, ConnectClient, PaginatedStream, Request, RetryConfig,
    TokenConfig,
};
pub use error::{classify, Error, Result};
pub use models::Document;

/// Prelude module for convenient imports.
///
/// ```rust
/// use connect_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::{Credentials, TokenIssuer};
    pub use crate::client::{
        require, ClientConfig, Collected, ConnectClient, PaginatedStream, Request, RetryConfig,
        TokenConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::models::{ApiErrorEntry, Document, Links, Meta, Paging};
}
