//! Conversation index and the last-write-wins cloud merge.
//!
//! `merge` reconciles a cloud snapshot against the local index inside a
//! single transaction: read everything once, stage inserts/updates,
//! commit in one go. A cloud record only replaces a local one when its
//! `last_activity_timestamp` is STRICTLY greater (lexicographic compare
//! over identical-precision UTC ISO-8601 strings) — ties and older
//! records leave local offline edits untouched.

use std::collections::HashMap;

use veil_proto::Urn;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::ConversationIndexRecord;

/// Counts of what one merge pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl Store {
    /// Reconcile a cloud index snapshot into the local table.
    pub async fn merge_conversation_index(
        &self,
        cloud: &[ConversationIndexRecord],
    ) -> Result<MergeOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // One read of the local state; decisions are made against this
        // snapshot and committed atomically with it.
        let local_rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT conversation_urn, last_activity_ts FROM conversation_index",
        )
        .fetch_all(&mut *tx)
        .await?;
        let local: HashMap<String, String> = local_rows.into_iter().collect();

        let mut outcome = MergeOutcome::default();

        for record in cloud {
            let key = record.conversation_urn.to_string();
            match local.get(&key) {
                None => {
                    sqlx::query(
                        "INSERT INTO conversation_index \
                         (conversation_urn, last_activity_ts, snippet, unread_count, preview_type, genesis_ts, last_modified) \
                         VALUES (?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(&key)
                    .bind(&record.last_activity_timestamp)
                    .bind(&record.snippet)
                    .bind(record.unread_count)
                    .bind(&record.preview_type)
                    .bind(&record.genesis_timestamp)
                    .bind(&record.last_modified)
                    .execute(&mut *tx)
                    .await?;
                    outcome.inserted += 1;
                }
                Some(local_ts) if record.last_activity_timestamp > *local_ts => {
                    sqlx::query(
                        "UPDATE conversation_index SET \
                         last_activity_ts = ?, snippet = ?, unread_count = ?, \
                         preview_type = ?, genesis_ts = ?, last_modified = ? \
                         WHERE conversation_urn = ?",
                    )
                    .bind(&record.last_activity_timestamp)
                    .bind(&record.snippet)
                    .bind(record.unread_count)
                    .bind(&record.preview_type)
                    .bind(&record.genesis_timestamp)
                    .bind(&record.last_modified)
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                    outcome.updated += 1;
                }
                Some(_) => outcome.unchanged += 1,
            }
        }

        tx.commit().await?;

        tracing::info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            "conversation index merge"
        );
        Ok(outcome)
    }

    /// Write one local index record (local activity, not cloud sync).
    pub async fn upsert_conversation(
        &self,
        record: &ConversationIndexRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversation_index \
             (conversation_urn, last_activity_ts, snippet, unread_count, preview_type, genesis_ts, last_modified) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(conversation_urn) DO UPDATE SET \
             last_activity_ts = excluded.last_activity_ts, snippet = excluded.snippet, \
             unread_count = excluded.unread_count, preview_type = excluded.preview_type, \
             genesis_ts = excluded.genesis_ts, last_modified = excluded.last_modified",
        )
        .bind(record.conversation_urn.to_string())
        .bind(&record.last_activity_timestamp)
        .bind(&record.snippet)
        .bind(record.unread_count)
        .bind(&record.preview_type)
        .bind(&record.genesis_timestamp)
        .bind(&record.last_modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch one index record.
    pub async fn conversation(
        &self,
        urn: &Urn,
    ) -> Result<Option<ConversationIndexRecord>, StoreError> {
        let row: Option<(String, String, String, i64, String, String, String)> = sqlx::query_as(
            "SELECT conversation_urn, last_activity_ts, snippet, unread_count, preview_type, genesis_ts, last_modified \
             FROM conversation_index WHERE conversation_urn = ?",
        )
        .bind(urn.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(
            |(conversation_urn, last_activity_ts, snippet, unread_count, preview_type, genesis_ts, last_modified)| {
                Ok(ConversationIndexRecord {
                    conversation_urn: Urn::parse(&conversation_urn)?,
                    last_activity_timestamp: last_activity_ts,
                    snippet,
                    unread_count,
                    preview_type,
                    genesis_timestamp: genesis_ts,
                    last_modified,
                })
            },
        )
        .transpose()
    }
}
