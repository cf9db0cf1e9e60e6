//! Collaborator contracts injected by the embedding application.
//!
//! The core never talks HTTP itself — the application supplies these
//! implementations (backed by its identity service, key directory and
//! relay) via constructor injection.

use async_trait::async_trait;
use veil_crypto::PublicKeyBundle;
use veil_proto::{SecureEnvelope, Urn};

use crate::error::ClientError;

/// Maps transient wire-level sender handles to durable canonical
/// identities and back.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Canonical contact identity for a wire handle.
    async fn resolve_handle(&self, wire_handle: &str) -> Result<Urn, ClientError>;

    /// Current wire handle for a contact.
    async fn current_handle(&self, urn: &Urn) -> Result<String, ClientError>;
}

/// Remote key directory — the source of truth for published keys.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn fetch_keys(&self, urn: &Urn) -> Result<PublicKeyBundle, ClientError>;

    async fn publish_keys(&self, urn: &Urn, keys: &PublicKeyBundle) -> Result<(), ClientError>;
}

/// Trust lookup for canonical identities (accepted-contact list).
#[async_trait]
pub trait TrustStore: Send + Sync {
    async fn is_trusted(&self, urn: &Urn) -> Result<bool, ClientError>;
}

/// Where the device-link poll loop looks for the peer's sync offer.
#[async_trait]
pub trait SyncOfferSource: Send + Sync {
    /// The offer envelope for a link session, if the peer has posted
    /// one yet. `None` means "keep polling".
    async fn poll_offer(&self, session_id: &str) -> Result<Option<SecureEnvelope>, ClientError>;
}
