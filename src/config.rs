// src/config.rs

use crate::error::ConfigError;
use jsonwebtoken::Algorithm;
use std::time::Duration;
use url::Url;

/// Default timeout for a key-set request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const JWKS_URL_ENV: &str = "JWKS_URL";
pub const JWKS_TIMEOUT_ENV: &str = "JWKS_TIMEOUT_SECS";
pub const JWKS_LEEWAY_ENV: &str = "JWKS_LEEWAY_SECS";
pub const JWKS_MIN_REFRESH_ENV: &str = "JWKS_MIN_REFRESH_SECS";
pub const JWKS_REFRESH_ENV: &str = "JWKS_REFRESH_SECS";

/// Checks applied to a token's header and time-based claims.
#[derive(Clone, Debug)]
pub struct ValidationDetails {
    /// Signing algorithms accepted in the token header.
    pub algorithms: Vec<Algorithm>,
    /// Tolerance for clock skew on `exp` (and `iat` when checked).
    /// Defaults to zero: `exp` must be strictly after now.
    pub leeway: Duration,
    /// Reject tokens whose `iat` lies further in the future than `leeway`.
    pub validate_iat: bool,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::ES256],
            leeway: Duration::ZERO,
            validate_iat: false,
        }
    }
}

/// How the cached key set is kept current.
#[derive(Clone, Debug, Default)]
pub struct RefreshPolicy {
    /// Lower bound between two fetches triggered by an unknown `kid`.
    /// Zero means every miss may refresh (coalesced by the single-flight).
    pub min_refresh_interval: Duration,
    /// When set, a background task refreshes the key set on this interval
    /// (or at 80% of the endpoint's `Cache-Control: max-age`, if sent).
    pub background_refresh: Option<Duration>,
}

/// Everything the verifier needs to know about its environment.
///
/// Construct it with [`ConfigBuilder`] or [`Config::from_env`].
#[derive(Clone, Debug)]
pub struct Config {
    /// The key-set endpoint.
    pub jwks_url: Url,
    /// Bound on a single key-set request.
    pub timeout: Duration,
    pub validation: ValidationDetails,
    pub refresh: RefreshPolicy,
}

impl Config {
    /// Builds a configuration from `JWKS_URL` and the optional
    /// `JWKS_TIMEOUT_SECS`, `JWKS_LEEWAY_SECS`, `JWKS_MIN_REFRESH_SECS`
    /// and `JWKS_REFRESH_SECS` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(JWKS_URL_ENV)
            .ok_or_else(|| ConfigError::MissingConfiguration(JWKS_URL_ENV.to_string()))?;
        let mut builder = ConfigBuilder::new().jwks_url(&url)?;

        if let Some(secs) = seconds(&lookup, JWKS_TIMEOUT_ENV)? {
            builder = builder.timeout(secs);
        }
        if let Some(secs) = seconds(&lookup, JWKS_LEEWAY_ENV)? {
            builder = builder.leeway(secs);
        }
        if let Some(secs) = seconds(&lookup, JWKS_MIN_REFRESH_ENV)? {
            builder = builder.min_refresh_interval(secs);
        }
        if let Some(secs) = seconds(&lookup, JWKS_REFRESH_ENV)? {
            builder = builder.background_refresh(secs);
        }
        builder.build()
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<Duration>, ConfigError> {
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                ConfigError::InvalidConfiguration(format!("{name}={raw:?}: {e}"))
            })
        })
        .transpose()
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    jwks_url: Option<Url>,
    timeout: Option<Duration>,
    validation: ValidationDetails,
    refresh: RefreshPolicy,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key-set endpoint URL. This is a required field.
    ///
    /// # Arguments
    ///
    /// * `url` - e.g. "https://<project>.supabase.co/auth/v1/.well-known/jwks.json".
    pub fn jwks_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "unsupported scheme '{}' in {url}",
                parsed.scheme()
            )));
        }
        self.jwks_url = Some(parsed);
        Ok(self)
    }

    /// Sets the key-set request timeout. Defaults to 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the allowed signing algorithms. Defaults to `[Algorithm::ES256]`.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Sets the clock skew tolerance. Defaults to zero.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Enables rejection of tokens issued in the future.
    pub fn validate_iat(mut self, validate: bool) -> Self {
        self.validation.validate_iat = validate;
        self
    }

    /// Sets the minimum spacing of refreshes caused by unknown key ids.
    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh.min_refresh_interval = interval;
        self
    }

    /// Enables the background refresh task with the given fallback interval.
    pub fn background_refresh(mut self, interval: Duration) -> Self {
        self.refresh.background_refresh = Some(interval);
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if `jwks_url` is missing, the timeout is zero, or no
    /// supported elliptic-curve algorithm is allowed.
    pub fn build(self) -> Result<Config, ConfigError> {
        let jwks_url = self
            .jwks_url
            .ok_or_else(|| ConfigError::MissingConfiguration("jwks_url".to_string()))?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if self.validation.algorithms.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "at least one algorithm must be allowed".to_string(),
            ));
        }
        if let Some(alg) = self
            .validation
            .algorithms
            .iter()
            .find(|alg| !matches!(alg, Algorithm::ES256 | Algorithm::ES384))
        {
            return Err(ConfigError::InvalidConfiguration(format!(
                "algorithm {alg:?} is not supported; only ES256 and ES384 are"
            )));
        }

        if matches!(self.refresh.background_refresh, Some(interval) if interval.is_zero()) {
            return Err(ConfigError::InvalidConfiguration(
                "background refresh interval must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            jwks_url,
            timeout,
            validation: self.validation,
            refresh: self.refresh,
        })
    }
}
