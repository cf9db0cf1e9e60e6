//! Message envelope and payload wire shapes.
//!
//! `SecureEnvelope` is the ONLY form a message takes on the wire:
//!   - `encryptedSymmetricKey` — session key wrapped under the
//!     recipient's RSA-OAEP public key, base64
//!   - `encryptedData` — AES-GCM `nonce || ciphertext+tag`, base64
//!   - `signature` — sender's RSA-PSS signature over the raw
//!     `encryptedData` bytes, base64
//!
//! `TransportMessage` is what `encryptedData` decrypts to. It is also
//! the quarantine-at-rest shape: for untrusted senders the whole
//! envelope payload is stored with `payloadBytes` still ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::urn::Urn;

/// Delivery priority hint carried on the envelope. Only two values
/// exist on the wire: 1 (interactive) and 5 (background sync).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Interactive,
    Background,
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Interactive),
            5 => Ok(Self::Background),
            other => Err(format!("invalid priority {other}, expected 1 or 5")),
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Interactive => 1,
            Priority::Background => 5,
        }
    }
}

/// On-wire envelope — encrypted and signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureEnvelope {
    /// Canonical URN of the recipient.
    pub recipient_id: Urn,

    /// Wrapped AES session key, base64.
    #[serde(with = "b64")]
    pub encrypted_symmetric_key: Vec<u8>,

    /// `nonce || ciphertext+tag`, base64. Always AEAD ciphertext —
    /// tampering is detectable.
    #[serde(with = "b64")]
    pub encrypted_data: Vec<u8>,

    /// RSA-PSS signature over the raw `encrypted_data` bytes, base64.
    /// Empty for link-session sync messages, whose authenticity comes
    /// from possession of the QR secret.
    #[serde(with = "b64")]
    pub signature: Vec<u8>,

    /// Set on device-link sync envelopes; they must never be persisted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_ephemeral: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub priority: Option<Priority>,
}

/// Decrypted wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMessage {
    /// Transient wire-level sender handle, resolved to a canonical URN
    /// by the gatekeeper before any trust decision.
    pub sender_id: String,

    pub sent_timestamp: DateTime<Utc>,

    /// Application payload type discriminator.
    pub type_id: u32,

    #[serde(with = "b64")]
    pub payload_bytes: Vec<u8>,

    /// Client-side record id for echo suppression / dedup.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_record_id: Option<String>,
}

/// Base64url (no padding) ↔ bytes for binary JSON fields.
pub(crate) mod b64 {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urn::Urn;
    use chrono::TimeZone;

    fn sample_envelope() -> SecureEnvelope {
        SecureEnvelope {
            recipient_id: Urn::user("bob").unwrap(),
            encrypted_symmetric_key: vec![1, 2, 3],
            encrypted_data: vec![4, 5, 6],
            signature: vec![7, 8, 9],
            is_ephemeral: None,
            priority: Some(Priority::Interactive),
        }
    }

    #[test]
    fn envelope_wire_field_names_are_camel_case() {
        let json = serde_json::to_value(sample_envelope()).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["recipientId", "encryptedSymmetricKey", "encryptedData", "signature", "priority"] {
            assert!(obj.contains_key(key), "missing wire field {key}");
        }
        // unset optionals are omitted entirely
        assert!(!obj.contains_key("isEphemeral"));
        assert_eq!(obj["priority"], 1);
    }

    #[test]
    fn envelope_json_roundtrip() {
        let envelope = sample_envelope();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: SecureEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encrypted_data, envelope.encrypted_data);
        assert_eq!(back.recipient_id, envelope.recipient_id);
        assert_eq!(back.priority, Some(Priority::Interactive));
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let json = r#"{"recipientId":"veil:contacts:user:bob","encryptedSymmetricKey":"","encryptedData":"","signature":"","priority":3}"#;
        assert!(serde_json::from_str::<SecureEnvelope>(json).is_err());
    }

    #[test]
    fn transport_message_roundtrip() {
        let msg = TransportMessage {
            sender_id: "handle-123".into(),
            sent_timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            type_id: 7,
            payload_bytes: b"payload".to_vec(),
            client_record_id: Some("rec-1".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("senderId"));
        assert!(json.contains("sentTimestamp"));
        assert!(json.contains("payloadBytes"));
        let back: TransportMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
