//! veil_crypto — Veil Messenger cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Secret material lives behind opaque key handles and is zeroized
//!   wherever it is ever materialised as raw bytes.
//! - The wire protocol (asymmetric key wrap + authenticated symmetric
//!   payload + asymmetric signature) is fixed for interoperability with
//!   other platform clients.
//!
//! # Module layout
//! - `keys`   — RSA key handles, SPKI export/import, fingerprints
//! - `engine` — hybrid encrypt/decrypt (RSA-OAEP wrap + AES-GCM payload)
//!              and RSA-PSS sign/verify
//! - `aead`   — raw AES-256-GCM helpers + one-time key generation
//! - `error`  — unified error type

pub mod aead;
pub mod engine;
pub mod error;
pub mod keys;

pub use error::CryptoError;
pub use keys::{
    EncryptionPrivateKey, EncryptionPublicKey, PrivateKeyBundle, PublicKeyBundle,
    SigningPrivateKey, SigningPublicKey,
};
