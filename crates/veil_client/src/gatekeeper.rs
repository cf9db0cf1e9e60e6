//! Inbound trust pipeline.
//!
//! Every inbound message passes through [`Gatekeeper::process`] before
//! anything else sees it:
//!
//!   1. Blocked check on the raw wire handle — a blocked sender costs
//!      nothing: no identity resolution, no storage write.
//!   2. Resolve the wire handle to a canonical identity, exactly once.
//!   3. Trust check on the canonical identity. Untrusted senders have
//!      their message quarantined at rest, payload still encrypted.
//!
//! Quarantined payloads are never decrypted here. They survive intact
//! until the user either accepts the sender (retrieval) or rejects them
//! (deletion, unread).

use std::collections::HashSet;
use std::sync::Arc;

use veil_proto::{TransportMessage, Urn};
use veil_store::Store;

use crate::error::ClientError;
use crate::traits::{IdentityResolver, TrustStore};

/// Why a message was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Sender is on the user's block list; nothing was stored.
    Blocked,
    /// Sender resolved but is not an accepted contact; the message was
    /// quarantined.
    Untrusted,
}

/// Outcome of the gate for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Deliver to the application, attributed to this identity.
    Allowed { sender: Urn },
    Denied { reason: DenyReason },
}

/// The inbound message gate.
pub struct Gatekeeper {
    resolver: Arc<dyn IdentityResolver>,
    trust: Arc<dyn TrustStore>,
    store: Store,
}

impl Gatekeeper {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        trust: Arc<dyn TrustStore>,
        store: Store,
    ) -> Self {
        Self { resolver, trust, store }
    }

    /// Gate one inbound message. `blocked` holds raw wire handles, so
    /// the blocked check runs before resolution.
    pub async fn process(
        &self,
        message: &TransportMessage,
        blocked: &HashSet<String>,
    ) -> Result<GateDecision, ClientError> {
        if blocked.contains(&message.sender_id) {
            tracing::debug!(handle = %message.sender_id, "dropped message from blocked sender");
            return Ok(GateDecision::Denied { reason: DenyReason::Blocked });
        }

        let sender = self.resolver.resolve_handle(&message.sender_id).await?;

        if self.trust.is_trusted(&sender).await? {
            return Ok(GateDecision::Allowed { sender });
        }

        self.store.quarantine_message(&sender, message).await?;
        tracing::info!(sender = %sender, "quarantined message from untrusted sender");
        Ok(GateDecision::Denied { reason: DenyReason::Untrusted })
    }

    /// Identities currently waiting on a trust decision.
    pub async fn pending_requests(&self) -> Result<Vec<Urn>, ClientError> {
        Ok(self.store.quarantined_senders().await?)
    }

    /// Everything a sender has in quarantine, oldest first, payloads
    /// still encrypted. Used when the user accepts a contact request.
    pub async fn retrieve_for_inspection(
        &self,
        sender: &Urn,
    ) -> Result<Vec<TransportMessage>, ClientError> {
        Ok(self.store.quarantined_messages(sender).await?)
    }

    /// Reject a sender: delete their quarantined messages unread.
    /// Returns how many were discarded.
    pub async fn reject(&self, sender: &Urn) -> Result<u64, ClientError> {
        let removed = self.store.delete_quarantined(sender).await?;
        tracing::info!(sender = %sender, removed, "rejected quarantined sender");
        Ok(removed)
    }
}
