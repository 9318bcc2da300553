// src/verifier.rs

use crate::cache::KeySetCache;
use crate::client::{JwksClient, KeySetSource};
use crate::config::Config;
use crate::error::{ConfigError, FetchError};
use crate::resolver::KeyResolver;
use crate::validator::{ValidationOutcome, Validator};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// The entry point for callers: hand it a raw bearer token, get back
/// verified claims or the reason there are none.
///
/// Create one per identity provider at startup and share it (behind an
/// `Arc`) across request handlers.
pub struct TokenVerifier {
    validator: Validator,
    refresh_task: Option<JoinHandle<()>>,
}

impl TokenVerifier {
    /// Creates a verifier that fetches keys from `config.jwks_url`.
    ///
    /// The key set is fetched lazily on first use; call
    /// [`warm_up`](Self::warm_up) to fetch it eagerly.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let client = JwksClient::from_config(&config)?;
        Ok(Self::with_source(Arc::new(client), &config))
    }

    /// Creates a verifier over any key-set source.
    ///
    /// If the config asks for background refresh and a tokio runtime is
    /// running, the refresh task is started here.
    pub fn with_source(source: Arc<dyn KeySetSource>, config: &Config) -> Self {
        let cache = Arc::new(KeySetCache::with_min_refresh_interval(
            source,
            config.refresh.min_refresh_interval,
        ));

        let refresh_task = match tokio::runtime::Handle::try_current() {
            Ok(_) => cache.spawn_for_policy(&config.refresh),
            Err(_) => {
                if config.refresh.background_refresh.is_some() {
                    warn!("No tokio runtime; background key-set refresh disabled");
                }
                None
            }
        };

        let resolver = KeyResolver::new(cache);
        Self {
            validator: Validator::new(resolver, config.validation.clone()),
            refresh_task,
        }
    }

    /// Fetches the key set now instead of on the first token.
    pub async fn warm_up(&self) -> Result<(), FetchError> {
        self.cache().get().await.map(|_| ())
    }

    /// The key-set cache behind this verifier.
    pub fn cache(&self) -> &Arc<KeySetCache> {
        self.validator.resolver().cache()
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        self.claims(token).await.is_ok()
    }

    pub async fn claims(&self, token: &str) -> ValidationOutcome {
        self.validator.validate(token).await
    }

    /// The `sub` of a valid token.
    pub async fn subject(&self, token: &str) -> Option<String> {
        self.claims(token)
            .await
            .ok()
            .map(|claims| claims.subject().to_string())
    }

    /// The `email` claim of a valid token, if it carries one.
    pub async fn email(&self, token: &str) -> Option<String> {
        self.claims(token)
            .await
            .ok()
            .and_then(|claims| claims.email().map(str::to_string))
    }
}

impl Drop for TokenVerifier {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}
