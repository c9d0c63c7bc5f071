//! HTTP client, request executor and pagination.
//!
//! This module provides the main entry point [`ConnectClient`].
//!
//! # Example
//!
//! ```no_run
//! use connect_core::{ConnectClient, Credentials, Request};
//!
//! # async fn example() -> connect_core::Result<()> {
//! let credentials = Credentials::from_key_file(
//!     "2X9R4HXF34",
//!     "57246542-96fe-1a63-e053-0824d011072a",
//!     "AuthKey_2X9R4HXF34.p8",
//! )?;
//! let client = ConnectClient::new(credentials)?;
//!
//! let body = client.execute(&Request::get("/v1/apps").query("limit", "1")).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod http;
pub mod paginated;
mod request;

pub use config::{ClientConfig, RetryConfig, TokenConfig, DEFAULT_AUDIENCE, DEFAULT_BASE_URL};
pub use http::ConnectClient;
pub use paginated::{Collected, PaginatedStream, DEFAULT_MAX_PAGES};
pub use request::{require, Request};
pub(crate) use http::ClientInner;
