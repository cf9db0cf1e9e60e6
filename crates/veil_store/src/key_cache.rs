//! Local half of the public-key cache: one row per identity, with the
//! fetch timestamp the TTL check runs against. The freshness policy
//! itself lives in the client layer — this module only stores.

use chrono::{DateTime, Utc};
use veil_crypto::PublicKeyBundle;
use veil_proto::Urn;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::KeyCacheEntry;

impl Store {
    /// The cached entry for an identity, if any.
    pub async fn cached_keys(&self, urn: &Urn) -> Result<Option<KeyCacheEntry>, StoreError> {
        let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT enc_key, sig_key, cached_at FROM key_cache WHERE urn = ?",
        )
        .bind(urn.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(enc_key, sig_key, cached_at)| KeyCacheEntry {
            urn: urn.clone(),
            keys: PublicKeyBundle { enc_key, sig_key },
            timestamp: cached_at,
        }))
    }

    /// Write through a freshly fetched bundle, stamping it now.
    pub async fn cache_keys(
        &self,
        urn: &Urn,
        keys: &PublicKeyBundle,
    ) -> Result<(), StoreError> {
        self.cache_keys_at(urn, keys, Utc::now()).await
    }

    /// Write through a bundle with an explicit fetch timestamp. Used
    /// when replaying an older directory snapshot whose fetch time must
    /// survive, and by the TTL tests.
    pub async fn cache_keys_at(
        &self,
        urn: &Urn,
        keys: &PublicKeyBundle,
        cached_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO key_cache (urn, enc_key, sig_key, cached_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(urn) DO UPDATE SET \
             enc_key = excluded.enc_key, sig_key = excluded.sig_key, cached_at = excluded.cached_at",
        )
        .bind(urn.to_string())
        .bind(&keys.enc_key)
        .bind(&keys.sig_key)
        .bind(cached_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop one identity's cached keys (key reset / verification flows).
    pub async fn evict_keys(&self, urn: &Urn) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM key_cache WHERE urn = ?")
            .bind(urn.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
