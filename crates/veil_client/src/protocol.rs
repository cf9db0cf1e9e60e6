//! Envelope protocol: the encrypt-and-sign / verify-and-decrypt flow.
//!
//! Outbound: serialise the transport message, hybrid-encrypt it to the
//! recipient, then sign the raw ciphertext bytes. Inbound runs in the
//! reverse order and verification ALWAYS precedes decryption — a bad
//! signature means the ciphertext is never opened.
//!
//! Link-session sync messages are the one exception to the signing
//! rule: they carry an empty signature and are marked ephemeral. Their
//! authenticity derives from possession of the QR secret, and AEAD
//! covers integrity.

use zeroize::Zeroizing;

use veil_crypto::{aead, engine, EncryptionPublicKey, PrivateKeyBundle};
use veil_proto::{Priority, SecureEnvelope, TransportMessage, Urn};

use crate::error::ClientError;
use crate::key_cache::KeyCache;

/// Key material for encrypting a link-session sync message; mirrors the
/// two QR modes.
pub enum SyncKey {
    /// Receiver-hosted: the peer's ephemeral RSA public key from the QR.
    Asymmetric(EncryptionPublicKey),
    /// Sender-hosted: the one-time AES key from the QR.
    Symmetric(Zeroizing<[u8; 32]>),
}

/// Key material for opening a link-session sync message.
pub enum SyncDecryptKey<'a> {
    /// Receiver-hosted: our ephemeral RSA private key.
    Asymmetric(&'a veil_crypto::EncryptionPrivateKey),
    /// Sender-hosted: the one-time AES key we put in the QR.
    Symmetric(&'a Zeroizing<[u8; 32]>),
}

/// The envelope protocol engine. Cheap to clone; key lookups go through
/// the shared [`KeyCache`].
#[derive(Clone)]
pub struct EnvelopeProtocol {
    keys: KeyCache,
}

impl EnvelopeProtocol {
    pub fn new(keys: KeyCache) -> Self {
        Self { keys }
    }

    /// Build a signed envelope for `recipient`. Fetches the recipient's
    /// published keys (through the cache), encrypts the serialised
    /// message, and signs the ciphertext with our signing key.
    pub async fn encrypt_and_sign(
        &self,
        message: &TransportMessage,
        recipient: &Urn,
        my_keys: &PrivateKeyBundle,
        priority: Priority,
    ) -> Result<SecureEnvelope, ClientError> {
        let recipient_keys = self.keys.get_public_key(recipient).await?;

        let plaintext = Zeroizing::new(serde_json::to_vec(message)?);
        let ct = engine::encrypt(&recipient_keys.encryption_key()?, &plaintext)?;
        let signature = engine::sign(&my_keys.sig, &ct.encrypted_data)?;

        Ok(SecureEnvelope {
            recipient_id: recipient.clone(),
            encrypted_symmetric_key: ct.encrypted_symmetric_key,
            encrypted_data: ct.encrypted_data,
            signature,
            is_ephemeral: None,
            priority: Some(priority),
        })
    }

    /// Verify and open an inbound envelope from `sender`.
    ///
    /// The sender's signature over `encrypted_data` is checked against
    /// their published signing key BEFORE any decryption happens.
    pub async fn verify_and_decrypt(
        &self,
        envelope: &SecureEnvelope,
        sender: &Urn,
        my_keys: &PrivateKeyBundle,
    ) -> Result<TransportMessage, ClientError> {
        let sender_keys = self.keys.get_public_key(sender).await?;
        engine::verify(
            &sender_keys.signing_key()?,
            &envelope.signature,
            &envelope.encrypted_data,
        )?;

        let plaintext = engine::decrypt(
            &my_keys.enc,
            &envelope.encrypted_symmetric_key,
            &envelope.encrypted_data,
        )?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Fingerprint of an identity's published signing key, for
    /// out-of-band verification.
    pub async fn get_fingerprint(&self, urn: &Urn) -> Result<String, ClientError> {
        let keys = self.keys.get_public_key(urn).await?;
        Ok(keys.fingerprint()?)
    }
}

/// Encrypt a link-session sync message under session key material from
/// the QR payload. The envelope is unsigned and marked ephemeral; it is
/// addressed to the session rather than a contact.
pub fn encrypt_sync_message(
    payload: &[u8],
    session_id: &str,
    key: &SyncKey,
) -> Result<SecureEnvelope, ClientError> {
    let (encrypted_symmetric_key, encrypted_data) = match key {
        SyncKey::Asymmetric(public) => {
            let ct = engine::encrypt(public, payload)?;
            (ct.encrypted_symmetric_key, ct.encrypted_data)
        }
        SyncKey::Symmetric(one_time_key) => (Vec::new(), aead::encrypt(one_time_key, payload)?),
    };

    Ok(SecureEnvelope {
        recipient_id: session_urn(session_id)?,
        encrypted_symmetric_key,
        encrypted_data,
        signature: Vec::new(),
        is_ephemeral: Some(true),
        priority: Some(Priority::Background),
    })
}

/// Open a link-session sync envelope with the matching key material.
pub fn decrypt_sync_message(
    envelope: &SecureEnvelope,
    key: &SyncDecryptKey<'_>,
) -> Result<Zeroizing<Vec<u8>>, ClientError> {
    let plaintext = match key {
        SyncDecryptKey::Asymmetric(private) => engine::decrypt(
            private,
            &envelope.encrypted_symmetric_key,
            &envelope.encrypted_data,
        )?,
        SyncDecryptKey::Symmetric(one_time_key) => {
            aead::decrypt(one_time_key, &envelope.encrypted_data)?
        }
    };
    Ok(plaintext)
}

/// Session-scoped envelope address used while a link session has no
/// contact identity yet.
fn session_urn(session_id: &str) -> Result<Urn, ClientError> {
    Ok(Urn::new("session", session_id, "link")?)
}
