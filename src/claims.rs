// src/claims.rs

use crate::error::VerifyError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// The verified payload of a token.
///
/// `sub` and `exp` are guaranteed present; everything else the provider put
/// in the payload is reachable through [`Claims::get`] or
/// [`Claims::deserialize_into`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Claims {
    #[serde(skip)]
    subject: String,
    #[serde(skip)]
    expires_at: i64,
    raw: Map<String, Value>,
}

impl Claims {
    /// Parses a decoded payload, requiring a string `sub` and numeric `exp`.
    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, VerifyError> {
        let raw: Map<String, Value> = serde_json::from_slice(payload)
            .map_err(|e| VerifyError::malformed(format!("payload is not a JSON object: {e}")))?;

        let subject = match raw.get("sub") {
            Some(Value::String(sub)) => sub.clone(),
            Some(_) => return Err(VerifyError::malformed("'sub' is not a string")),
            None => return Err(VerifyError::malformed("missing 'sub' claim")),
        };
        let expires_at = match raw.get("exp") {
            Some(exp) => numeric_date(exp)
                .ok_or_else(|| VerifyError::malformed("'exp' is not a NumericDate"))?,
            None => return Err(VerifyError::malformed("missing 'exp' claim")),
        };
        if let Some(iat) = raw.get("iat") {
            numeric_date(iat).ok_or_else(|| VerifyError::malformed("'iat' is not a NumericDate"))?;
        }

        Ok(Self {
            subject,
            expires_at,
            raw,
        })
    }

    /// The `sub` claim; for Supabase this is the user id.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The `exp` claim as Unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// The `iat` claim as Unix seconds, if present.
    pub fn issued_at(&self) -> Option<i64> {
        self.raw.get("iat").and_then(numeric_date)
    }

    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    pub fn role(&self) -> Option<&str> {
        self.get_str("role")
    }

    /// Any claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(Value::as_str)
    }

    /// All claims as sent.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Deserializes the claims into a provider-specific type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.raw.clone()))
    }
}

/// RFC 7519 NumericDate: integral or fractional seconds since the epoch.
fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
}
