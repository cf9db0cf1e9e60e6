//! veil_client — Veil Messenger client core
//!
//! Orchestrates the secure-messaging subsystem on top of the lower
//! crates:
//!
//! - `protocol`   — encrypt-and-sign / verify-and-decrypt envelope flow,
//!                  plus the session-keyed sync variant used by linking
//! - `key_cache`  — TTL-bounded read-through cache over the remote key
//!                  directory; fail-closed presence checks; key reset
//! - `gatekeeper` — trust/quarantine decision pipeline for inbound
//!                  messages
//! - `linking`    — QR device-link handshake state machine with a single
//!                  cancellable polling loop per session
//! - `traits`     — collaborator contracts (identity resolver, key
//!                  directory, trust store, sync-offer source) injected
//!                  by the embedding application
//!
//! Everything here runs on one tokio runtime; all storage
//! read-modify-write sequences go through `veil_store` transactions.

pub mod error;
pub mod gatekeeper;
pub mod key_cache;
pub mod linking;
pub mod protocol;
pub mod traits;

pub use error::ClientError;
pub use gatekeeper::{DenyReason, GateDecision, Gatekeeper};
pub use key_cache::KeyCache;
pub use linking::{
    build_link_offer, parse_qr_code, LinkHandshake, LinkOutcome, LinkStage, ParsedQr,
    SenderSession,
};
pub use protocol::{EnvelopeProtocol, SyncDecryptKey, SyncKey};
pub use traits::{IdentityResolver, KeyDirectory, SyncOfferSource, TrustStore};
