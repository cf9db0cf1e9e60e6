//! Record types stored by (or exchanged with) the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veil_crypto::PublicKeyBundle;
use veil_proto::Urn;

use crate::error::StoreError;

// ── Outbox ───────────────────────────────────────────────────────────────────

/// Coarse overall status of a delivery task. Tracked independently of
/// recipient-level status; `Completed` does not have to mean every
/// recipient succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Per-recipient delivery state. Moves monotonically
/// pending → sent → (delivered | failed); regressions are ignored and
/// a terminal state never changes into the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl RecipientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }

    /// Ordering used to enforce monotonic progress.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered | Self::Failed => 2,
        }
    }

    /// Delivered and failed are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

/// Delivery progress for one recipient of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientProgress {
    pub urn: Urn,
    pub status: RecipientStatus,
    pub attempts: u32,
}

impl RecipientProgress {
    pub fn pending(urn: Urn) -> Self {
        Self { urn, status: RecipientStatus::Pending, attempts: 0 }
    }
}

/// One durable outbound delivery unit. The payload is immutable after
/// `add_task`; only statuses and attempt counters change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTask {
    pub id: String,
    pub message_id: String,
    pub conversation_urn: Urn,
    pub type_id: u32,
    pub payload: Vec<u8>,
    pub tags: Vec<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub recipients: Vec<RecipientProgress>,
}

// ── Conversation index ───────────────────────────────────────────────────────

/// One row of the conversation index, as synced with the cloud copy.
///
/// Timestamps are kept as strings: the last-write-wins comparison is
/// lexicographic and is only sound because every writer emits UTC
/// ISO-8601 with identical precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIndexRecord {
    pub conversation_urn: Urn,
    pub last_activity_timestamp: String,
    pub snippet: String,
    pub unread_count: i64,
    pub preview_type: String,
    pub genesis_timestamp: String,
    pub last_modified: String,
}

// ── Key cache ────────────────────────────────────────────────────────────────

/// Locally cached public keys for one identity, with fetch timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCacheEntry {
    pub urn: Urn,
    pub keys: PublicKeyBundle,
    pub timestamp: DateTime<Utc>,
}
