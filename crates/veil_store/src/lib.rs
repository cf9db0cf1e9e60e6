//! veil_store — Local database for the Veil Messenger client core
//!
//! SQLite via sqlx. Every multi-step read-modify-write sequence
//! (conversation merge, per-recipient progress updates, quarantine
//! writes) runs inside an explicit transaction so it stays atomic
//! relative to other concurrent async operations on the same store.
//!
//! # At-rest strategy
//! Quarantined payloads and outbox payloads arrive as ciphertext or
//! caller-owned opaque bytes; they are stored base64-encoded without a
//! second encryption layer. Metadata (timestamps, URNs, statuses) is
//! plaintext to keep the listing and resumable-work queries cheap.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on first open.

pub mod conversations;
pub mod db;
pub mod error;
pub mod key_cache;
pub mod models;
pub mod outbox;
pub mod quarantine;

pub use conversations::MergeOutcome;
pub use db::Store;
pub use error::StoreError;
pub use models::{
    ConversationIndexRecord, KeyCacheEntry, OutboundTask, RecipientProgress, RecipientStatus,
    TaskStatus,
};
