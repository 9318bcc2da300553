// src/resolver.rs

use crate::cache::KeySetCache;
use crate::error::ResolveError;
use crate::model::KeyEntry;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Finds the key-set entry a token names, tolerating key rotation.
#[derive(Clone)]
pub struct KeyResolver {
    cache: Arc<KeySetCache>,
}

impl KeyResolver {
    pub fn new(cache: Arc<KeySetCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<KeySetCache> {
        &self.cache
    }

    /// Looks `kid` up in the current snapshot.
    ///
    /// A miss forces one refresh (shared with any concurrent misses) and one
    /// more lookup; a second miss is final.
    #[instrument(skip(self), err)]
    pub async fn resolve(&self, kid: &str) -> Result<KeyEntry, ResolveError> {
        let snapshot = self.cache.get().await?;
        if let Some(entry) = snapshot.document.find(kid) {
            debug!(generation = snapshot.generation, "Key cache hit");
            return Ok(entry.clone());
        }

        debug!(
            generation = snapshot.generation,
            "Key cache miss; refreshing key set"
        );
        let refreshed = self.cache.refresh_after(snapshot.generation).await?;

        refreshed.document.find(kid).cloned().ok_or_else(|| {
            warn!(
                generation = refreshed.generation,
                "kid absent after refresh"
            );
            ResolveError::UnknownKeyId(kid.to_string())
        })
    }
}
