//! Komainu Library
//!
//! Bearer-token authentication with key rotation.
//!
//! # Features
//!
//! - **Key Rotation**: Tokens verify against an ordered list of trusted keys;
//!   the first key signs
//! - **Lazy Per-Request Token**: Claims are extracted and verified on first
//!   read and cached for the rest of the request
//! - **Pluggable Extraction**: Configurable auth scheme, plus an optional
//!   custom getter (query parameter, header, or any closure)
//! - **HMAC, RSA, ECDSA, EdDSA**: Via `jsonwebtoken`
//!
//! # Example
//!
//! ```no_run
//! use komainu::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod metrics;
pub mod server;

// Re-export commonly used types
pub use auth::{AuthError, AuthOptions, KeyStore, RequestContext, SignOptions, TokenAuthenticator};
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
