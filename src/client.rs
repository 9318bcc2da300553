// src/client.rs

use crate::config::Config;
use crate::error::{ConfigError, FetchError};
use crate::model::{JsonWebKeySet, KeySetDocument};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Anything that can produce the current key-set document.
///
/// The HTTP implementation is [`JwksClient`]; the cache only depends on this
/// trait, so it can be driven by a stub in tests.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Performs one retrieval. Never returns a partial document.
    async fn fetch(&self) -> Result<KeySetDocument, FetchError>;
}

/// Fetches the key set from a JWKS endpoint over HTTP.
#[derive(Clone)]
pub struct JwksClient {
    http_client: reqwest::Client,
    jwks_url: Url,
}

impl JwksClient {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(jwks_url: Url, timeout: Duration) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http_client(jwks_url, http_client))
    }

    /// Creates a client around a preconfigured `reqwest::Client`.
    pub fn with_http_client(jwks_url: Url, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            jwks_url,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.jwks_url.clone(), config.timeout)
    }

    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetSource for JwksClient {
    #[instrument(skip(self), fields(url = %self.jwks_url), err)]
    async fn fetch(&self) -> Result<KeySetDocument, FetchError> {
        let response = self.http_client.get(self.jwks_url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let max_age = parse_cache_control(&response);
        let body = response.bytes().await?;
        let jwks: JsonWebKeySet = serde_json::from_slice(&body)
            .map_err(|e| FetchError::InvalidBody(e.to_string()))?;

        let document = KeySetDocument::from_jwks(jwks)?.with_max_age(max_age);
        debug!(keys = document.len(), ?max_age, "Fetched key set");
        Ok(document)
    }
}

/// Parses the `Cache-Control` header to determine the TTL.
fn parse_cache_control(response: &reqwest::Response) -> Option<Duration> {
    let header = response
        .headers()
        .get(reqwest::header::CACHE_CONTROL)?
        .to_str()
        .ok()?;
    max_age(header)
}

fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|part| {
        part.trim()
            .strip_prefix("max-age=")?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_max_age_among_directives() {
        assert_eq!(
            max_age("public, max-age=600, must-revalidate"),
            Some(Duration::from_secs(600))
        );
        assert_eq!(max_age("no-cache"), None);
        assert_eq!(max_age("max-age=soon"), None);
    }
}
