// src/lib.rs

//! Verifies bearer tokens signed with elliptic-curve keys published at a
//! JWKS endpoint.
//!
//! The pipeline is explicit: split the compact token, resolve its `kid`
//! against a cached key set (refreshing once on a miss), rebuild the public
//! key from its coordinates, verify the signature over the original bytes,
//! then decode and time-check the claims. Every failure comes back as a
//! [`VerifyError`](error::VerifyError).
//!
//! ```rust,no_run
//! use jwks_verifier::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigBuilder::new()
//!     .jwks_url("https://project.supabase.co/auth/v1/.well-known/jwks.json")?
//!     .build()?;
//! let verifier = TokenVerifier::new(config)?;
//!
//! match verifier.claims("eyJhbGciOiJFUzI1NiIs...").await {
//!     Ok(claims) => println!("user {}", claims.subject()),
//!     Err(e) => println!("rejected: {}", e.kind()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod claims;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod public_key;
pub mod resolver;
pub mod token;
pub mod validator;
pub mod verifier;

/// Re-exports the most commonly used types.
pub mod prelude {
    pub use crate::claims::Claims;
    pub use crate::client::{JwksClient, KeySetSource};
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::{ConfigError, FailureKind, FetchError, VerifyError};
    pub use crate::validator::ValidationOutcome;
    pub use crate::verifier::TokenVerifier;
    pub use jsonwebtoken::Algorithm;
}
