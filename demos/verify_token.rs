//! Verifies a bearer token against the key set named by `JWKS_URL`.
//!
//! ```text
//! JWKS_URL=https://<project>.supabase.co/auth/v1/.well-known/jwks.json \
//!     RUST_LOG=jwks_verifier=debug \
//!     cargo run --example verify_token -- <token>
//! ```

use jwks_verifier::prelude::*;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(token) = std::env::args().nth(1) else {
        eprintln!("usage: verify_token <token>");
        return ExitCode::from(2);
    };

    let verifier = match Config::from_env().and_then(TokenVerifier::new) {
        Ok(verifier) => verifier,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = verifier.warm_up().await {
        error!("Could not fetch key set: {}", e);
    }

    match verifier.claims(&token).await {
        Ok(claims) => {
            info!(sub = claims.subject(), exp = claims.expires_at(), "Token is valid");
            match serde_json::to_string_pretty(&claims) {
                Ok(json) => println!("{json}"),
                Err(e) => error!("Could not render claims: {}", e),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("rejected: {} ({})", e.kind().code(), e);
            ExitCode::FAILURE
        }
    }
}
