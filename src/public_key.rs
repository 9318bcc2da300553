// src/public_key.rs

//! Turns JWK elliptic-curve coordinates into verification keys.
//!
//! `x` and `y` arrive as big-endian unsigned integers. Providers are free to
//! strip leading zero octets (or, rarely, add one), so each coordinate is
//! normalised to the curve's field width before the SEC1 uncompressed point
//! `0x04 || X || Y` is assembled and checked against the curve equation.

use crate::error::KeyBuildError;
use crate::model::{KeyEntry, KeyType};
use jsonwebtoken::Algorithm;
use p256::ecdsa::signature::Verifier;

const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// The supported NIST curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// Parses a JWK `crv` value.
    pub fn from_crv(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(EcCurve::P256),
            "P-384" => Some(EcCurve::P384),
            _ => None,
        }
    }

    /// Width in bytes of a field element (and of each signature half).
    pub fn field_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
        }
    }

    /// The JWS algorithm that signs with this curve.
    pub fn algorithm(self) -> Algorithm {
        match self {
            EcCurve::P256 => Algorithm::ES256,
            EcCurve::P384 => Algorithm::ES384,
        }
    }
}

/// A public key ready to check JWS signatures.
#[derive(Debug, Clone)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

/// The signature could not be parsed or did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadSignature;

impl PublicKey {
    pub fn curve(&self) -> EcCurve {
        match self {
            PublicKey::P256(_) => EcCurve::P256,
            PublicKey::P384(_) => EcCurve::P384,
        }
    }

    /// Verifies a raw `r || s` JWS signature over `message`.
    ///
    /// The digest (SHA-256 or SHA-384) follows from the curve.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), BadSignature> {
        if signature.len() != 2 * self.curve().field_len() {
            return Err(BadSignature);
        }
        match self {
            PublicKey::P256(key) => {
                let signature =
                    p256::ecdsa::Signature::from_slice(signature).map_err(|_| BadSignature)?;
                key.verify(message, &signature).map_err(|_| BadSignature)
            }
            PublicKey::P384(key) => {
                let signature =
                    p384::ecdsa::Signature::from_slice(signature).map_err(|_| BadSignature)?;
                key.verify(message, &signature).map_err(|_| BadSignature)
            }
        }
    }
}

/// Builds the verification key described by a key-set entry.
///
/// Pure: the same entry always yields an equivalent key.
pub fn build(entry: &KeyEntry) -> Result<PublicKey, KeyBuildError> {
    if let KeyType::Other(kty) = entry.kty() {
        return Err(KeyBuildError::UnsupportedKeyType(kty.clone()));
    }

    let crv = entry.crv().unwrap_or_default();
    let curve =
        EcCurve::from_crv(crv).ok_or_else(|| KeyBuildError::UnsupportedCurve(crv.to_string()))?;

    let point = uncompressed_point(curve.field_len(), entry.x(), entry.y())?;
    match curve {
        EcCurve::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
            .map(PublicKey::P256)
            .map_err(|_| not_on_curve(entry, crv)),
        EcCurve::P384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
            .map(PublicKey::P384)
            .map_err(|_| not_on_curve(entry, crv)),
    }
}

fn not_on_curve(entry: &KeyEntry, crv: &str) -> KeyBuildError {
    KeyBuildError::InvalidCoordinates(format!(
        "key '{}' does not describe a point on {crv}",
        entry.kid()
    ))
}

/// Assembles `0x04 || X || Y` with both coordinates at exactly `field_len`
/// bytes.
fn uncompressed_point(field_len: usize, x: &[u8], y: &[u8]) -> Result<Vec<u8>, KeyBuildError> {
    let mut point = Vec::with_capacity(1 + 2 * field_len);
    point.push(SEC1_UNCOMPRESSED_TAG);
    write_field_element(&mut point, field_len, x, "x")?;
    write_field_element(&mut point, field_len, y, "y")?;
    Ok(point)
}

/// Appends `value` as a big-endian integer left-padded to `field_len` bytes.
fn write_field_element(
    out: &mut Vec<u8>,
    field_len: usize,
    value: &[u8],
    name: &str,
) -> Result<(), KeyBuildError> {
    let first_significant = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let significant = &value[first_significant..];
    if significant.len() > field_len {
        return Err(KeyBuildError::InvalidCoordinates(format!(
            "'{name}' is {} bytes, wider than the {field_len}-byte field",
            significant.len()
        )));
    }
    out.resize(out.len() + field_len - significant.len(), 0);
    out.extend_from_slice(significant);
    Ok(())
}
