//! Authentication for the wrapped service.
//!
//! Requests are authorised with short-lived ES256 JSON Web Tokens signed
//! locally with a P-256 private key. No network call is involved in
//! obtaining a token.
//!
//! - [`Credentials`] holds the key identifier, issuer identifier and the
//!   parsed private key.
//! - [`TokenIssuer`] mints tokens from those credentials, caches the current
//!   one, and refreshes it shortly before it expires.
//!
//! ```no_run
//! use connect_core::{Credentials, TokenIssuer, TokenConfig};
//!
//! # async fn example() -> connect_core::Result<()> {
//! let credentials = Credentials::from_env()?;
//! let issuer = TokenIssuer::new(credentials, TokenConfig::default())?;
//! let token = issuer.token().await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod credentials;
mod issuer;

pub use credentials::{
    Credentials, ENV_ISSUER_ID, ENV_KEY_ID, ENV_PRIVATE_KEY, ENV_PRIVATE_KEY_PATH,
};
pub use issuer::TokenIssuer;
