// src/error.rs

use thiserror::Error;

/// Errors raised while building a [`Config`](crate::config::Config) or the
/// components wired from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A provided URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The HTTP client used for key-set retrieval could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A failure to retrieve or parse the remote key-set document.
///
/// Cloneable so a single in-flight fetch can hand the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The endpoint could not be reached.
    #[error("Key-set request failed: {0}")]
    Transport(String),

    /// The endpoint did not answer within the configured timeout.
    #[error("Key-set request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("Key-set endpoint returned HTTP {0}")]
    Status(u16),

    /// The response body is not a JWKS document.
    #[error("Key-set body is malformed: {0}")]
    InvalidBody(String),

    /// A key entry is missing a required field or carries undecodable material.
    #[error("Key '{kid}' in key set is invalid: {reason}")]
    InvalidKey { kid: String, reason: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_decode() {
            FetchError::InvalidBody(error.to_string())
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

/// Failure to find a key for a token's `kid`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The key set could not be (re)fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The `kid` is absent even after one forced refresh.
    #[error("Key not found for kid: {0}")]
    UnknownKeyId(String),
}

/// Failure to turn a key-set entry into a verification key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyBuildError {
    /// The entry's `kty` is not `EC`.
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The entry names a curve other than P-256 or P-384.
    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// The coordinates do not describe a point on the named curve.
    #[error("Invalid EC coordinates: {0}")]
    InvalidCoordinates(String),
}

/// Why a token could not be verified.
///
/// This is the complete set of outcomes a caller has to handle; it never
/// crosses the facade as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The key set could not be fetched while looking for the token's key.
    #[error("Failed to fetch key set: {0}")]
    Fetch(FetchError),

    /// No key with the token's `kid` exists, even after a refresh.
    #[error("Key not found for kid: {0}")]
    UnknownKeyId(String),

    /// The key exists but is not usable elliptic-curve material.
    #[error(transparent)]
    UnsupportedKeyType(#[from] KeyBuildError),

    /// The token is structurally invalid or lacks a required field.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The signature does not verify under the resolved key.
    #[error("Token signature is invalid")]
    SignatureInvalid,

    /// The signature is valid but `exp` has passed.
    #[error("Token has expired (exp: {exp})")]
    Expired { exp: i64 },
}

impl VerifyError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        VerifyError::MalformedToken(reason.into())
    }

    /// The failure kind, without detail.
    pub fn kind(&self) -> FailureKind {
        match self {
            VerifyError::Fetch(_) => FailureKind::FetchError,
            VerifyError::UnknownKeyId(_) => FailureKind::UnknownKeyId,
            VerifyError::UnsupportedKeyType(_) => FailureKind::UnsupportedKeyType,
            VerifyError::MalformedToken(_) => FailureKind::MalformedToken,
            VerifyError::SignatureInvalid => FailureKind::SignatureInvalid,
            VerifyError::Expired { .. } => FailureKind::Expired,
        }
    }

    /// Whether the failure may clear up on its own (the identity provider was
    /// unreachable) rather than being a property of the token.
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifyError::Fetch(_))
    }
}

impl From<ResolveError> for VerifyError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Fetch(e) => VerifyError::Fetch(e),
            ResolveError::UnknownKeyId(kid) => VerifyError::UnknownKeyId(kid),
        }
    }
}

/// Detail-free tag for a [`VerifyError`], suitable for metrics labels and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    FetchError,
    UnknownKeyId,
    UnsupportedKeyType,
    MalformedToken,
    SignatureInvalid,
    Expired,
}

impl FailureKind {
    /// Stable snake_case code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::FetchError => "fetch_error",
            FailureKind::UnknownKeyId => "unknown_key_id",
            FailureKind::UnsupportedKeyType => "unsupported_key_type",
            FailureKind::MalformedToken => "malformed_token",
            FailureKind::SignatureInvalid => "signature_invalid",
            FailureKind::Expired => "expired",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_keep_their_kind() {
        let fetch: VerifyError = ResolveError::Fetch(FetchError::Timeout).into();
        assert_eq!(fetch.kind(), FailureKind::FetchError);
        assert!(fetch.is_transient());

        let unknown: VerifyError = ResolveError::UnknownKeyId("k1".into()).into();
        assert_eq!(unknown, VerifyError::UnknownKeyId("k1".into()));
        assert!(!unknown.is_transient());
    }

    #[test]
    fn every_key_build_error_is_unsupported_key_type() {
        for e in [
            KeyBuildError::UnsupportedKeyType("RSA".into()),
            KeyBuildError::UnsupportedCurve("P-521".into()),
            KeyBuildError::InvalidCoordinates("not on curve".into()),
        ] {
            assert_eq!(VerifyError::from(e).kind(), FailureKind::UnsupportedKeyType);
        }
    }

    #[test]
    fn failure_codes_are_stable() {
        assert_eq!(FailureKind::UnknownKeyId.code(), "unknown_key_id");
        assert_eq!(FailureKind::Expired.to_string(), "expired");
        assert_eq!(
            VerifyError::Expired { exp: 1 }.kind().code(),
            "expired"
        );
    }
}
