//! Outbox: durable per-recipient delivery tracking.
//!
//! This core owns only the state contract. An external delivery loop
//! polls `pending_tasks` and reports progress back; no retry scheduling
//! happens here.
//!
//! Recipient updates are per-recipient keyed upserts inside one
//! transaction. Two concurrent sessions reporting progress for different
//! recipients of the same task therefore cannot clobber each other, and
//! a recipient absent from an update is never altered.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use veil_proto::Urn;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{OutboundTask, RecipientProgress, RecipientStatus, TaskStatus};

impl Store {
    /// Persist a new delivery task. The payload and recipient list are
    /// fixed at this point; only statuses change afterwards.
    pub async fn add_task(&self, task: &OutboundTask) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO outbox_tasks \
             (id, message_id, conversation_urn, type_id, payload_b64, tags, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.message_id)
        .bind(task.conversation_urn.to_string())
        .bind(i64::from(task.type_id))
        .bind(URL_SAFE_NO_PAD.encode(&task.payload))
        .bind(serde_json::to_string(&task.tags)?)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .execute(&mut *tx)
        .await?;

        for recipient in &task.recipients {
            sqlx::query(
                "INSERT INTO outbox_recipients (task_id, recipient_urn, status, attempts) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&task.id)
            .bind(recipient.urn.to_string())
            .bind(recipient.status.as_str())
            .bind(i64::from(recipient.attempts))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Every task whose overall status is not `completed` — the
    /// resumable work queue for the external delivery loop.
    pub async fn pending_tasks(&self) -> Result<Vec<OutboundTask>, StoreError> {
        let rows: Vec<(String, String, String, i64, String, String, String, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT id, message_id, conversation_urn, type_id, payload_b64, tags, status, created_at \
                 FROM outbox_tasks WHERE status != 'completed' ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for (id, message_id, conversation_urn, type_id, payload_b64, tags, status, created_at) in rows
        {
            let recipients = self.recipients_for(&id).await?;
            tasks.push(OutboundTask {
                message_id,
                conversation_urn: Urn::parse(&conversation_urn)?,
                type_id: type_id as u32,
                payload: URL_SAFE_NO_PAD.decode(payload_b64)?,
                tags: serde_json::from_str(&tags)?,
                status: TaskStatus::parse(&status)?,
                created_at,
                recipients,
                id,
            });
        }
        Ok(tasks)
    }

    /// Set the coarse overall status. Independent of recipient-level
    /// status — `Completed` does not imply every recipient succeeded.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE outbox_tasks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("outbox task {task_id}")));
        }
        Ok(())
    }

    /// Report progress for a subset of a task's recipients. Each entry
    /// is upserted by (task, recipient) key inside one transaction;
    /// statuses only move forward (pending → sent → delivered/failed)
    /// and a terminal status never flips to the other terminal — such
    /// updates are ignored with a warning.
    pub async fn update_recipient_progress(
        &self,
        task_id: &str,
        recipients: &[RecipientProgress],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM outbox_tasks WHERE id = ?")
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("outbox task {task_id}")));
        }

        for recipient in recipients {
            let current: Option<(String,)> = sqlx::query_as(
                "SELECT status FROM outbox_recipients WHERE task_id = ? AND recipient_urn = ?",
            )
            .bind(task_id)
            .bind(recipient.urn.to_string())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((status,)) = &current {
                let stored = RecipientStatus::parse(status)?;
                let regresses = recipient.status.rank() < stored.rank()
                    || (stored.is_terminal() && recipient.status != stored);
                if regresses {
                    tracing::warn!(
                        task = task_id,
                        recipient = %recipient.urn,
                        from = stored.as_str(),
                        to = recipient.status.as_str(),
                        "ignoring recipient status regression"
                    );
                    continue;
                }
            }

            sqlx::query(
                "INSERT INTO outbox_recipients (task_id, recipient_urn, status, attempts) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT(task_id, recipient_urn) \
                 DO UPDATE SET status = excluded.status, attempts = excluded.attempts",
            )
            .bind(task_id)
            .bind(recipient.urn.to_string())
            .bind(recipient.status.as_str())
            .bind(i64::from(recipient.attempts))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove one task (recipients cascade).
    pub async fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM outbox_tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop the whole outbox.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM outbox_tasks")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recipients_for(&self, task_id: &str) -> Result<Vec<RecipientProgress>, StoreError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT recipient_urn, status, attempts FROM outbox_recipients \
             WHERE task_id = ? ORDER BY recipient_urn ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(urn, status, attempts)| {
                Ok(RecipientProgress {
                    urn: Urn::parse(&urn)?,
                    status: RecipientStatus::parse(&status)?,
                    attempts: attempts as u32,
                })
            })
            .collect()
    }
}
