// src/validator.rs

use crate::claims::Claims;
use crate::config::ValidationDetails;
use crate::error::VerifyError;
use crate::public_key;
use crate::resolver::KeyResolver;
use crate::token::CompactToken;
use jsonwebtoken::Algorithm;
use tracing::{debug, instrument};

/// The result of validating one token.
pub type ValidationOutcome = Result<Claims, VerifyError>;

/// Checks a token's signature and validity window against the key set.
///
/// Each step either hands its output to the next or returns the first
/// failure; the payload is not parsed until the signature is known good.
#[derive(Clone)]
pub struct Validator {
    resolver: KeyResolver,
    validation: ValidationDetails,
}

impl Validator {
    pub fn new(resolver: KeyResolver, validation: ValidationDetails) -> Self {
        Self {
            resolver,
            validation,
        }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Validates `token` against the current time.
    pub async fn validate(&self, token: &str) -> ValidationOutcome {
        self.validate_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Validates `token` as of `now` (Unix seconds).
    ///
    /// 1. Split into three segments.
    /// 2. Decode the header; require an allowed `alg` and a `kid`.
    /// 3. Resolve the key, refreshing once on a miss.
    /// 4. Build the public key.
    /// 5. Verify the signature over the original `header.payload` bytes.
    /// 6. Decode the claims.
    /// 7. Check `exp` (and `iat` if enabled).
    #[instrument(skip(self, token), err(level = "debug"))]
    pub async fn validate_at(&self, token: &str, now: i64) -> ValidationOutcome {
        let token = CompactToken::parse(token)?;

        let header = token.header()?;
        if !self.validation.algorithms.contains(&header.alg) {
            return Err(VerifyError::malformed(format!(
                "algorithm {:?} is not allowed",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| VerifyError::malformed("header is missing 'kid'"))?;

        let entry = self.resolver.resolve(&kid).await?;

        let key = public_key::build(&entry)?;

        // The header may not pick a different algorithm than the key supports.
        if key.curve().algorithm() != header.alg {
            debug!(alg = ?header.alg, curve = ?key.curve(), "Algorithm does not match key curve");
            return Err(VerifyError::SignatureInvalid);
        }
        if let Some(hint) = entry.alg() {
            if hint.parse::<Algorithm>().ok() != Some(header.alg) {
                debug!(alg = ?header.alg, hint, "Algorithm does not match key's alg hint");
                return Err(VerifyError::SignatureInvalid);
            }
        }
        let signature = token.signature()?;
        key.verify(token.signing_input(), &signature)
            .map_err(|_| VerifyError::SignatureInvalid)?;

        let claims = Claims::from_payload(&token.payload()?)?;

        self.check_times(&claims, now)?;
        Ok(claims)
    }

    fn check_times(&self, claims: &Claims, now: i64) -> Result<(), VerifyError> {
        let leeway = i64::try_from(self.validation.leeway.as_secs()).unwrap_or(i64::MAX);

        let exp = claims.expires_at();
        if exp.saturating_add(leeway) <= now {
            return Err(VerifyError::Expired { exp });
        }

        if self.validation.validate_iat {
            if let Some(iat) = claims.issued_at() {
                if iat > now.saturating_add(leeway) {
                    return Err(VerifyError::malformed(format!(
                        "token issued in the future (iat: {iat})"
                    )));
                }
            }
        }
        Ok(())
    }
}
