//! veil_proto — Wire types, envelopes, and serialisation for Veil Messenger
//!
//! All on-wire types are serialised to JSON with camelCase field names —
//! the field names are part of the protocol and interoperate with the
//! other platform clients.
//!
//! # Modules
//! - `urn`      — canonical four-segment entity identifiers
//! - `envelope` — SecureEnvelope (wire form) + TransportMessage (payload form)
//! - `qr`       — device-link QR payload
//! - `error`    — unified error type

pub mod envelope;
pub mod error;
pub mod qr;
pub mod urn;

pub use envelope::{Priority, SecureEnvelope, TransportMessage};
pub use error::ProtoError;
pub use qr::{LinkMode, QrPayload};
pub use urn::Urn;
