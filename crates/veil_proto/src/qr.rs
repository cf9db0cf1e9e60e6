//! Device-link QR payload.
//!
//! The QR code carries a compact JSON object:
//!
//!   `{ "s": <sessionId>, "k": <base64-key>, "m": "rh"|"sh", "v": 1 }`
//!
//! `m` selects the key type `k` decodes to:
//!   - `"rh"` (receiver-hosted) — an ephemeral RSA-OAEP public key (SPKI)
//!   - `"sh"` (sender-hosted)   — an ephemeral 32-byte AES one-time key
//!
//! Parsing validates the mode tag BEFORE any key material is decoded, so
//! malformed or unknown payloads are rejected without touching crypto.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Current QR payload schema version.
pub const QR_SCHEMA_VERSION: u8 = 1;

/// Which side of the link hosts the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// New device shows the QR; existing device scans and sends the key
    /// bundle encrypted to the ephemeral public key in the QR.
    ReceiverHosted,
    /// Existing device shows the QR; new device scans and receives the
    /// bundle under the one-time symmetric key in the QR.
    SenderHosted,
}

impl LinkMode {
    pub fn tag(self) -> &'static str {
        match self {
            Self::ReceiverHosted => "rh",
            Self::SenderHosted => "sh",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, ProtoError> {
        match tag {
            "rh" => Ok(Self::ReceiverHosted),
            "sh" => Ok(Self::SenderHosted),
            other => Err(ProtoError::UnknownQrMode(other.to_string())),
        }
    }
}

/// Raw QR payload as encoded in the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrPayload {
    /// Session id.
    pub s: String,
    /// Base64url key material; meaning depends on `m`.
    pub k: String,
    /// Mode tag.
    pub m: String,
    /// Schema version.
    pub v: u8,
}

impl QrPayload {
    pub fn new(session_id: &str, key_b64: String, mode: LinkMode) -> Self {
        Self {
            s: session_id.to_string(),
            k: key_b64,
            m: mode.tag().to_string(),
            v: QR_SCHEMA_VERSION,
        }
    }

    /// Parse a scanned QR string. JSON failures map to `InvalidQrFormat`;
    /// an unrecognised mode tag maps to `UnknownQrMode` — both raised
    /// before any key material is decoded.
    pub fn parse(qr_string: &str) -> Result<(Self, LinkMode), ProtoError> {
        let payload: Self = serde_json::from_str(qr_string)
            .map_err(|e| ProtoError::InvalidQrFormat(e.to_string()))?;
        let mode = LinkMode::from_tag(&payload.m)?;
        Ok((payload, mode))
    }

    /// Decode the key material. Call only after the mode tag has been
    /// validated by `parse`.
    pub fn key_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(URL_SAFE_NO_PAD.decode(&self.k)?)
    }

    /// Serialise to the string embedded in the QR code.
    pub fn encode(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }
}
