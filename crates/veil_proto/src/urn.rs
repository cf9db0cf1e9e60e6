//! Canonical entity identifiers.
//!
//! Every addressable entity — user, group, conversation — is identified
//! by a four-segment URN:
//!
//!   `veil:<namespace>:<entityType>:<entityId>`
//!
//! URNs are immutable once constructed; equality is string equality of
//! the canonical form, and `Display` reproduces it exactly (round-trip
//! law: `Urn::parse(s).to_string() == s` for every valid `s`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Literal scheme tag every URN begins with.
pub const SCHEME: &str = "veil";

/// Default namespace for the contacts/messenger application.
pub const DEFAULT_NAMESPACE: &str = "contacts";

/// Entity type for a person.
pub const ENTITY_USER: &str = "user";

/// Entity type for a group conversation. Group identities have no
/// published key material — callers inspect `entity_type()` to skip
/// key-presence checks for them.
pub const ENTITY_GROUP: &str = "group";

/// A parsed, canonical entity identifier. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn {
    namespace: String,
    entity_type: String,
    entity_id: String,
}

impl Urn {
    /// Build a URN from its parts. Fails with `InvalidIdentity` if the
    /// entity type or entity id is empty, or any part contains a colon
    /// (which would break the canonical form).
    pub fn new(
        entity_type: &str,
        entity_id: &str,
        namespace: &str,
    ) -> Result<Self, ProtoError> {
        if entity_type.is_empty() || entity_id.is_empty() {
            return Err(ProtoError::InvalidIdentity(
                "entity type and entity id must be non-empty".into(),
            ));
        }
        for part in [namespace, entity_type, entity_id] {
            if part.contains(':') {
                return Err(ProtoError::InvalidIdentity(format!(
                    "segment {part:?} contains a reserved ':'"
                )));
            }
        }
        Ok(Self {
            namespace: namespace.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        })
    }

    /// A user URN in the default namespace.
    pub fn user(entity_id: &str) -> Result<Self, ProtoError> {
        Self::new(ENTITY_USER, entity_id, DEFAULT_NAMESPACE)
    }

    /// A group URN in the default namespace.
    pub fn group(entity_id: &str) -> Result<Self, ProtoError> {
        Self::new(ENTITY_GROUP, entity_id, DEFAULT_NAMESPACE)
    }

    /// Parse a canonical four-segment string. Fails unless there are
    /// exactly four colon-delimited segments beginning with the literal
    /// scheme tag.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        let segments: Vec<&str> = s.split(':').collect();
        if segments.len() != 4 {
            return Err(ProtoError::InvalidIdentity(format!(
                "expected 4 segments, got {}",
                segments.len()
            )));
        }
        if segments[0] != SCHEME {
            return Err(ProtoError::InvalidIdentity(format!(
                "unknown scheme {:?}",
                segments[0]
            )));
        }
        Self::new(segments[2], segments[3], segments[1])
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// True for group identities, which carry no published keys.
    pub fn is_group(&self) -> bool {
        self.entity_type == ENTITY_GROUP
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}:{}:{}:{}",
            self.namespace, self.entity_type, self.entity_id
        )
    }
}

impl TryFrom<String> for Urn {
    type Error = ProtoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.to_string()
    }
}

impl std::str::FromStr for Urn {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
