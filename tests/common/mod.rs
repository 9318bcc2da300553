#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jwks_verifier::client::KeySetSource;
use jwks_verifier::error::FetchError;
use jwks_verifier::model::{KeyEntry, KeySetDocument};
use p256::ecdsa::signature::Signer;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

pub fn b64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

enum Signing {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

/// A deterministic EC signing key with the JWK that publishes it.
pub struct TestKey {
    pub kid: String,
    signing: Signing,
}

impl TestKey {
    pub fn p256(kid: &str, seed: u8) -> Self {
        Self {
            kid: kid.to_string(),
            signing: Signing::P256(p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap()),
        }
    }

    pub fn p384(kid: &str, seed: u8) -> Self {
        Self {
            kid: kid.to_string(),
            signing: Signing::P384(p384::ecdsa::SigningKey::from_slice(&[seed; 48]).unwrap()),
        }
    }

    pub fn alg(&self) -> &'static str {
        match self.signing {
            Signing::P256(_) => "ES256",
            Signing::P384(_) => "ES384",
        }
    }

    fn crv(&self) -> &'static str {
        match self.signing {
            Signing::P256(_) => "P-256",
            Signing::P384(_) => "P-384",
        }
    }

    fn coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        match &self.signing {
            Signing::P256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                (point.x().unwrap().to_vec(), point.y().unwrap().to_vec())
            }
            Signing::P384(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                (point.x().unwrap().to_vec(), point.y().unwrap().to_vec())
            }
        }
    }

    pub fn jwk(&self) -> Value {
        let (x, y) = self.coordinates();
        json!({
            "kty": "EC",
            "kid": self.kid,
            "crv": self.crv(),
            "x": b64(x),
            "y": b64(y),
            "alg": self.alg(),
            "use": "sig"
        })
    }

    pub fn entry(&self) -> KeyEntry {
        let (x, y) = self.coordinates();
        KeyEntry::ec(
            self.kid.clone(),
            self.crv(),
            x,
            y,
            Some(self.alg().to_string()),
        )
    }

    fn sign_bytes(&self, message: &[u8]) -> Vec<u8> {
        match &self.signing {
            Signing::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
            Signing::P384(key) => {
                let signature: p384::ecdsa::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
        }
    }

    /// Signs an arbitrary header and payload.
    pub fn sign(&self, header: &Value, claims: &Value) -> String {
        let signing_input = format!(
            "{}.{}",
            b64(serde_json::to_vec(header).unwrap()),
            b64(serde_json::to_vec(claims).unwrap())
        );
        let signature = self.sign_bytes(signing_input.as_bytes());
        format!("{signing_input}.{}", b64(signature))
    }

    /// Signs `claims` with the standard header for this key.
    pub fn token(&self, claims: &Value) -> String {
        self.sign(
            &json!({ "alg": self.alg(), "typ": "JWT", "kid": self.kid }),
            claims,
        )
    }
}

/// Claims of a Supabase-style access token valid for an hour.
pub fn user_claims(sub: &str) -> Value {
    let now = now();
    json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "role": "authenticated",
        "aud": "authenticated",
        "iat": now,
        "exp": now + 3600,
    })
}

pub fn jwks(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

pub fn document(keys: &[&TestKey]) -> KeySetDocument {
    KeySetDocument::new(keys.iter().map(|k| k.entry()).collect())
}

/// A key-set source that replays scripted results and counts fetches.
///
/// Once the script is exhausted the last result repeats.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<KeySetDocument, FetchError>>>,
    last: Mutex<Option<Result<KeySetDocument, FetchError>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<KeySetDocument, FetchError>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    pub fn with_delay(
        script: Vec<Result<KeySetDocument, FetchError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for ScriptedSource {
    async fn fetch(&self) -> Result<KeySetDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last
                .clone()
                .unwrap_or(Err(FetchError::Transport("script exhausted".into()))),
        }
    }
}
