//! Quarantine table: at-rest storage for messages from untrusted senders.
//!
//! Rows hold the raw TransportMessage with `payload_bytes` STILL
//! ciphertext — nothing in this module (or anywhere else in the core)
//! decrypts a quarantined message. If the user later accepts the sender,
//! the rows are retrievable without loss; if they reject, the rows are
//! deleted unread.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use veil_proto::{TransportMessage, Urn};

use crate::db::Store;
use crate::error::StoreError;

impl Store {
    /// Persist one still-encrypted message for an untrusted sender.
    pub async fn quarantine_message(
        &self,
        sender: &Urn,
        message: &TransportMessage,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO quarantine \
             (id, sender_urn, wire_sender_id, sent_at, type_id, payload_b64, client_record_id, quarantined_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(sender.to_string())
        .bind(&message.sender_id)
        .bind(message.sent_timestamp)
        .bind(i64::from(message.type_id))
        .bind(URL_SAFE_NO_PAD.encode(&message.payload_bytes))
        .bind(&message.client_record_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Distinct identities with at least one quarantined message.
    pub async fn quarantined_senders(&self) -> Result<Vec<Urn>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT sender_urn FROM quarantine ORDER BY sender_urn ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(s,)| Urn::parse(&s).map_err(StoreError::Identity))
            .collect()
    }

    /// All quarantined messages for one sender, oldest first. Payloads
    /// come back exactly as they went in (still encrypted).
    pub async fn quarantined_messages(
        &self,
        sender: &Urn,
    ) -> Result<Vec<TransportMessage>, StoreError> {
        let rows: Vec<(String, DateTime<Utc>, i64, String, Option<String>)> = sqlx::query_as(
            "SELECT wire_sender_id, sent_at, type_id, payload_b64, client_record_id \
             FROM quarantine WHERE sender_urn = ? ORDER BY quarantined_at ASC",
        )
        .bind(sender.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(wire_sender_id, sent_at, type_id, payload_b64, client_record_id)| {
                Ok(TransportMessage {
                    sender_id: wire_sender_id,
                    sent_timestamp: sent_at,
                    type_id: type_id as u32,
                    payload_bytes: URL_SAFE_NO_PAD.decode(payload_b64)?,
                    client_record_id,
                })
            })
            .collect()
    }

    /// Delete every quarantined message from one sender (explicit
    /// decline/block). Returns the number of rows removed.
    pub async fn delete_quarantined(&self, sender: &Urn) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM quarantine WHERE sender_urn = ?")
            .bind(sender.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
