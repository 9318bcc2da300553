// src/token.rs

use crate::error::VerifyError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::Header;

/// A compact JWS split into its three segments.
///
/// Borrows from the input so the signing input `header.payload` is checked
/// byte-for-byte as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactToken<'a> {
    raw: &'a str,
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> CompactToken<'a> {
    /// Splits `token` on `.` into exactly three non-empty segments.
    pub fn parse(token: &'a str) -> Result<Self, VerifyError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(VerifyError::malformed("expected three dot-separated segments"));
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(VerifyError::malformed("empty token segment"));
        }
        Ok(Self {
            raw: token,
            header,
            payload,
            signature,
        })
    }

    /// The exact `header.payload` span the signature covers.
    pub fn signing_input(&self) -> &'a [u8] {
        let end = self.header.len() + 1 + self.payload.len();
        &self.raw.as_bytes()[..end]
    }

    /// Decodes the JOSE header.
    pub fn header(&self) -> Result<Header, VerifyError> {
        let bytes = decode_segment(self.header, "header")?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VerifyError::malformed(format!("header is not a JOSE header: {e}")))
    }

    /// Decodes the raw signature bytes.
    pub fn signature(&self) -> Result<Vec<u8>, VerifyError> {
        URL_SAFE_NO_PAD
            .decode(self.signature)
            .map_err(|_| VerifyError::SignatureInvalid)
    }

    /// Decodes the payload bytes. Only meaningful once the signature has
    /// been verified.
    pub fn payload(&self) -> Result<Vec<u8>, VerifyError> {
        decode_segment(self.payload, "payload")
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, VerifyError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| VerifyError::malformed(format!("{name} is not base64url: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    fn b64(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    #[test]
    fn splits_three_segments_and_keeps_signing_input_verbatim() {
        let raw = format!("{}.{}.c2ln", b64(r#"{"alg":"ES256","kid":"k1"}"#), b64("{}"));
        let token = CompactToken::parse(&raw).unwrap();

        let dot = raw.rfind('.').unwrap();
        assert_eq!(token.signing_input(), raw[..dot].as_bytes());

        let header = token.header().unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("k1"));
        assert_eq!(token.signature().unwrap(), b"sig");
        assert_eq!(token.payload().unwrap(), b"{}");
    }

    #[test]
    fn rejects_wrong_segment_counts() {
        for raw in ["", "a", "a.b", "a.b.c.d", "a..c", ".b.c"] {
            assert!(
                matches!(CompactToken::parse(raw), Err(VerifyError::MalformedToken(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn unknown_algorithms_are_malformed_headers() {
        let raw = format!("{}.e30.c2ln", b64(r#"{"alg":"none"}"#));
        let token = CompactToken::parse(&raw).unwrap();
        assert!(matches!(token.header(), Err(VerifyError::MalformedToken(_))));
    }
}
