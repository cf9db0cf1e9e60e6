//! Key handles and key material import/export.
//!
//! Every user holds two long-term RSA-2048 keypairs:
//!   - an encryption pair (RSA-OAEP, SHA-256) used to wrap session keys
//!   - a signing pair (RSA-PSS, SHA-256) used to sign ciphertext
//!
//! Public halves travel as SPKI DER, base64url-encoded on the wire.
//! Private halves are opaque handles; they are only ever serialised
//! (PKCS#8 DER) for the encrypted device-link transfer, and that byte
//! buffer is zeroized as soon as it has been consumed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Human-readable fingerprint of key bytes: SHA-256, hex-encoded in
/// groups of 4 for display.
///
/// Example: "a1b2 c3d4 e5f6 7890 ..."
pub fn fingerprint(key_bytes: &[u8]) -> String {
    let digest = Sha256::digest(key_bytes);
    let hex = hex::encode(digest);
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Public key handles ───────────────────────────────────────────────────────

/// RSA-OAEP public key (recipient side of the session-key wrap).
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionPublicKey(pub(crate) RsaPublicKey);

/// RSA-PSS public key (verification side of the ciphertext signature).
#[derive(Debug, Clone, PartialEq)]
pub struct SigningPublicKey(pub(crate) RsaPublicKey);

macro_rules! impl_public_key {
    ($ty:ident) => {
        impl $ty {
            /// Export as SPKI DER bytes.
            pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
                Ok(self
                    .0
                    .to_public_key_der()
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                    .as_bytes()
                    .to_vec())
            }

            /// Export as base64url SPKI (the wire/QR form).
            pub fn to_b64(&self) -> Result<String, CryptoError> {
                Ok(URL_SAFE_NO_PAD.encode(self.to_der()?))
            }

            /// Import from SPKI DER bytes.
            pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
                RsaPublicKey::from_public_key_der(der)
                    .map(Self)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))
            }

            /// Import from base64url SPKI.
            pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
                let der = URL_SAFE_NO_PAD.decode(s)?;
                Self::from_der(&der)
            }

            /// Display fingerprint for out-of-band verification.
            pub fn fingerprint(&self) -> Result<String, CryptoError> {
                Ok(fingerprint(&self.to_der()?))
            }
        }
    };
}

impl_public_key!(EncryptionPublicKey);
impl_public_key!(SigningPublicKey);

// ── Private key handles ──────────────────────────────────────────────────────

/// Opaque RSA-OAEP private key handle.
pub struct EncryptionPrivateKey(pub(crate) RsaPrivateKey);

/// Opaque RSA-PSS private key handle.
pub struct SigningPrivateKey(pub(crate) RsaPrivateKey);

macro_rules! impl_private_key {
    ($ty:ident, $public:ident) => {
        impl $ty {
            /// Public half of this keypair.
            pub fn public_key(&self) -> $public {
                $public(RsaPublicKey::from(&self.0))
            }

            /// PKCS#8 DER export. Only for the encrypted device-link
            /// transfer — the returned buffer zeroizes on drop.
            pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
                let doc = self
                    .0
                    .to_pkcs8_der()
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
                Ok(Zeroizing::new(doc.as_bytes().to_vec()))
            }

            /// Import from PKCS#8 DER bytes.
            pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
                RsaPrivateKey::from_pkcs8_der(der)
                    .map(Self)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))
            }
        }
    };
}

impl_private_key!(EncryptionPrivateKey, EncryptionPublicKey);
impl_private_key!(SigningPrivateKey, SigningPublicKey);

// ── Bundles ──────────────────────────────────────────────────────────────────

/// A user's published public keys, in wire form (base64url SPKI).
/// This is the JSON shape the remote key directory serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyBundle {
    /// RSA-OAEP public key, base64url SPKI
    pub enc_key: String,
    /// RSA-PSS public key, base64url SPKI
    pub sig_key: String,
}

impl PublicKeyBundle {
    pub fn from_keys(
        enc: &EncryptionPublicKey,
        sig: &SigningPublicKey,
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            enc_key: enc.to_b64()?,
            sig_key: sig.to_b64()?,
        })
    }

    /// Decode the encryption half.
    pub fn encryption_key(&self) -> Result<EncryptionPublicKey, CryptoError> {
        EncryptionPublicKey::from_b64(&self.enc_key)
    }

    /// Decode the signing half.
    pub fn signing_key(&self) -> Result<SigningPublicKey, CryptoError> {
        SigningPublicKey::from_b64(&self.sig_key)
    }

    /// Fingerprint of the signing key (the identity users verify).
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        let der = URL_SAFE_NO_PAD.decode(&self.sig_key)?;
        Ok(fingerprint(&der))
    }
}

/// A user's private key handles. Never serialised to storage in
/// plaintext — the only export path is the encrypted link transfer.
pub struct PrivateKeyBundle {
    pub enc: EncryptionPrivateKey,
    pub sig: SigningPrivateKey,
}

/// PKCS#8 export shape carried inside an encrypted sync message during
/// device linking. Private to this module apart from the two transfer
/// functions below.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateKeyExport {
    enc_key: String,
    sig_key: String,
}

impl PrivateKeyBundle {
    /// Public halves of this bundle.
    pub fn public_bundle(&self) -> Result<PublicKeyBundle, CryptoError> {
        PublicKeyBundle::from_keys(&self.enc.public_key(), &self.sig.public_key())
    }

    /// Serialise for the encrypted device-link transfer. The plaintext
    /// MUST immediately be fed into the sync-message encryption; the
    /// buffer zeroizes on drop.
    pub fn to_sync_bytes(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let export = PrivateKeyExport {
            enc_key: URL_SAFE_NO_PAD.encode(self.enc.to_pkcs8_der()?.as_slice()),
            sig_key: URL_SAFE_NO_PAD.encode(self.sig.to_pkcs8_der()?.as_slice()),
        };
        Ok(Zeroizing::new(serde_json::to_vec(&export)?))
    }

    /// Reconstruct a bundle from decrypted link-transfer bytes.
    pub fn from_sync_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let export: PrivateKeyExport = serde_json::from_slice(bytes)?;
        let enc_der = Zeroizing::new(URL_SAFE_NO_PAD.decode(&export.enc_key)?);
        let sig_der = Zeroizing::new(URL_SAFE_NO_PAD.decode(&export.sig_key)?);
        Ok(Self {
            enc: EncryptionPrivateKey::from_pkcs8_der(&enc_der)?,
            sig: SigningPrivateKey::from_pkcs8_der(&sig_der)?,
        })
    }
}
