//! TTL-bounded read-through cache of recipients' public keys.
//!
//! Reads prefer the local cache while the entry is younger than the
//! TTL, then fall back to the remote key directory with a write-through.
//! Writes always hit the directory FIRST — the cache is never the
//! source of truth.
//!
//! `has_keys` is fail-closed: any failure (network, storage, malformed
//! key material) reads as "no keys". Absence of a verifiable channel is
//! never treated as implicit trust.

use std::sync::Arc;

use chrono::{Duration, Utc};
use veil_crypto::{engine, PrivateKeyBundle, PublicKeyBundle};
use veil_proto::Urn;
use veil_store::Store;

use crate::error::ClientError;
use crate::traits::KeyDirectory;

/// Cache entries older than this are refetched.
pub const KEY_CACHE_TTL_HOURS: i64 = 16;

/// Read-through public-key cache. Cheap to clone.
#[derive(Clone)]
pub struct KeyCache {
    store: Store,
    directory: Arc<dyn KeyDirectory>,
}

impl KeyCache {
    pub fn new(store: Store, directory: Arc<dyn KeyDirectory>) -> Self {
        Self { store, directory }
    }

    /// Current public keys for an identity: cache hit below the TTL, or
    /// a directory fetch written through with a fresh timestamp.
    pub async fn get_public_key(&self, urn: &Urn) -> Result<PublicKeyBundle, ClientError> {
        if let Some(entry) = self.store.cached_keys(urn).await? {
            let age = Utc::now() - entry.timestamp;
            if age < Duration::hours(KEY_CACHE_TTL_HOURS) {
                return Ok(entry.keys);
            }
            tracing::debug!(urn = %urn, "key cache entry expired, refetching");
        }

        let keys = self.directory.fetch_keys(urn).await?;
        self.store.cache_keys(urn, &keys).await?;
        Ok(keys)
    }

    /// Key-presence check. `false` on ANY failure — fail-closed.
    pub async fn has_keys(&self, urn: &Urn) -> bool {
        match self.get_public_key(urn).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(urn = %urn, error = %e, "key presence check failed closed");
                false
            }
        }
    }

    /// Publish keys: remote directory first, then the local cache.
    pub async fn store_keys(&self, urn: &Urn, keys: &PublicKeyBundle) -> Result<(), ClientError> {
        self.directory.publish_keys(urn, keys).await?;
        self.store.cache_keys(urn, keys).await?;
        Ok(())
    }

    /// Generate and publish a fresh identity keypair set, returning the
    /// new private handles. The old keys stop being served immediately.
    pub async fn reset_keys(&self, urn: &Urn) -> Result<PrivateKeyBundle, ClientError> {
        let (enc_public, enc_private) = engine::generate_encryption_keys()?;
        let (sig_public, sig_private) = engine::generate_signing_keys()?;

        let bundle = PublicKeyBundle::from_keys(&enc_public, &sig_public)?;
        self.store_keys(urn, &bundle).await?;

        tracing::info!(urn = %urn, "identity keys reset and republished");
        Ok(PrivateKeyBundle { enc: enc_private, sig: sig_private })
    }
}
