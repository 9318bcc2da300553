// src/model.rs

use crate::error::FetchError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::warn;

/// Base64url that tolerates optional padding, as some providers pad
/// JWK coordinates.
const COORDINATE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Represents a single JSON Web Key (JWK) as served by the endpoint (RFC 7517).
#[derive(Debug, Deserialize)]
pub struct JsonWebKey {
    pub kid: Option<String>,
    pub kty: Option<String>,
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    pub alg: Option<String>,
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

/// The `kty` of a key entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    /// Elliptic curve, the only family keys are built for.
    Ec,
    /// Anything else, kept so that lookups can report it precisely.
    Other(String),
}

impl KeyType {
    fn parse(kty: &str) -> Self {
        match kty {
            "EC" => KeyType::Ec,
            other => KeyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyType::Ec => "EC",
            KeyType::Other(kty) => kty,
        }
    }
}

/// One validated entry of a key set. Immutable once constructed.
///
/// `x` and `y` hold the decoded big-endian coordinate bytes; they are empty
/// for non-EC entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    kid: String,
    kty: KeyType,
    crv: Option<String>,
    x: Vec<u8>,
    y: Vec<u8>,
    alg: Option<String>,
}

impl KeyEntry {
    /// Creates an elliptic-curve entry from already decoded coordinates.
    pub fn ec(
        kid: impl Into<String>,
        crv: impl Into<String>,
        x: Vec<u8>,
        y: Vec<u8>,
        alg: Option<String>,
    ) -> Self {
        Self {
            kid: kid.into(),
            kty: KeyType::Ec,
            crv: Some(crv.into()),
            x,
            y,
            alg,
        }
    }

    /// Creates an entry of a key type this crate does not build keys for.
    pub fn other(kid: impl Into<String>, kty: impl Into<String>, alg: Option<String>) -> Self {
        Self {
            kid: kid.into(),
            kty: KeyType::parse(&kty.into()),
            crv: None,
            x: Vec::new(),
            y: Vec::new(),
            alg,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn kty(&self) -> &KeyType {
        &self.kty
    }

    pub fn crv(&self) -> Option<&str> {
        self.crv.as_deref()
    }

    pub fn x(&self) -> &[u8] {
        &self.x
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    /// The `alg` hint published with the key, if any.
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }
}

impl TryFrom<JsonWebKey> for KeyEntry {
    type Error = FetchError;

    fn try_from(jwk: JsonWebKey) -> Result<Self, Self::Error> {
        let kid = jwk.kid.ok_or_else(|| FetchError::InvalidKey {
            kid: "<missing>".to_string(),
            reason: "missing 'kid'".to_string(),
        })?;
        let invalid = |reason: String| FetchError::InvalidKey {
            kid: kid.clone(),
            reason,
        };
        let kty = jwk.kty.ok_or_else(|| invalid("missing 'kty'".to_string()))?;

        // Coordinates must decode wherever they appear.
        let x = jwk
            .x
            .as_deref()
            .map(|x| decode_coordinate("x", x))
            .transpose()
            .map_err(&invalid)?;
        let y = jwk
            .y
            .as_deref()
            .map(|y| decode_coordinate("y", y))
            .transpose()
            .map_err(&invalid)?;

        if KeyType::parse(&kty) != KeyType::Ec {
            return Ok(KeyEntry::other(kid, kty, jwk.alg));
        }

        let crv = jwk.crv.ok_or_else(|| invalid("EC key missing 'crv'".to_string()))?;
        let x = x.ok_or_else(|| invalid("EC key missing 'x'".to_string()))?;
        let y = y.ok_or_else(|| invalid("EC key missing 'y'".to_string()))?;

        Ok(KeyEntry::ec(kid, crv, x, y, jwk.alg))
    }
}

fn decode_coordinate(name: &str, value: &str) -> Result<Vec<u8>, String> {
    let bytes = COORDINATE_ENGINE
        .decode(value)
        .map_err(|e| format!("'{name}' is not valid base64url: {e}"))?;
    if bytes.is_empty() {
        return Err(format!("'{name}' is empty"));
    }
    Ok(bytes)
}

/// An ordered collection of key entries, as fetched at one point in time.
#[derive(Debug, Clone)]
pub struct KeySetDocument {
    keys: Vec<KeyEntry>,
    fetched_at: Instant,
    max_age: Option<Duration>,
}

impl KeySetDocument {
    /// Creates a document stamped with the current time.
    ///
    /// Duplicate key ids are tolerated; lookups return the first one.
    pub fn new(keys: Vec<KeyEntry>) -> Self {
        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key.kid()) {
                warn!(kid = %key.kid(), "Duplicate kid in key set; the first entry wins");
            }
        }
        Self {
            keys,
            fetched_at: Instant::now(),
            max_age: None,
        }
    }

    /// Records the freshness lifetime announced by the endpoint.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Validates every entry of a wire key set. Any invalid entry fails the
    /// whole document.
    pub fn from_jwks(jwks: JsonWebKeySet) -> Result<Self, FetchError> {
        let keys = jwks
            .keys
            .into_iter()
            .map(KeyEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(keys))
    }

    /// The first entry with the given key id.
    pub fn find(&self, kid: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|key| key.kid() == kid)
    }

    pub fn keys(&self) -> &[KeyEntry] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// `Cache-Control: max-age` sent with the document, if any.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }
}
