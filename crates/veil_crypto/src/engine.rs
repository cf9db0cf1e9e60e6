//! Hybrid encryption engine.
//!
//! # Wire protocol (fixed — interoperates with the other platform clients)
//!
//! Encrypt:
//!   1. Generate a fresh random 32-byte AES session key + 12-byte nonce.
//!   2. AES-256-GCM the plaintext → `encrypted_data = nonce || ct+tag`.
//!   3. Wrap the session key under the recipient's RSA-OAEP public key
//!      → `encrypted_symmetric_key`.
//!
//! Decrypt reverses the steps and MUST fail on tag mismatch — the engine
//! never returns unauthenticated plaintext.
//!
//! Signatures are RSA-PSS (SHA-256, random salt) over raw bytes; the
//! envelope layer signs ciphertext, never plaintext.

use rand::rngs::OsRng;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier as _};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aead;
use crate::error::CryptoError;
use crate::keys::{
    EncryptionPrivateKey, EncryptionPublicKey, SigningPrivateKey, SigningPublicKey,
};

/// RSA modulus size. 2048 bits wraps a 32-byte session key with ample
/// OAEP headroom and matches the keys published by existing clients.
const RSA_BITS: usize = 2048;

/// Output of a hybrid encryption: the wrapped session key plus the
/// AEAD ciphertext (nonce || ct+tag).
#[derive(Debug, Clone)]
pub struct HybridCiphertext {
    pub encrypted_symmetric_key: Vec<u8>,
    pub encrypted_data: Vec<u8>,
}

/// Generate an RSA-OAEP keypair for session-key wrapping.
pub fn generate_encryption_keys(
) -> Result<(EncryptionPublicKey, EncryptionPrivateKey), CryptoError> {
    let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((EncryptionPublicKey(public), EncryptionPrivateKey(private)))
}

/// Generate an RSA-PSS keypair for signatures.
pub fn generate_signing_keys() -> Result<(SigningPublicKey, SigningPrivateKey), CryptoError> {
    let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((SigningPublicKey(public), SigningPrivateKey(private)))
}

/// Hybrid-encrypt `plaintext` to the recipient's encryption key.
pub fn encrypt(
    recipient: &EncryptionPublicKey,
    plaintext: &[u8],
) -> Result<HybridCiphertext, CryptoError> {
    let session_key = aead::generate_key();
    let encrypted_data = aead::encrypt(&session_key, plaintext)?;

    let encrypted_symmetric_key = recipient
        .0
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), session_key.as_slice())
        .map_err(|_| CryptoError::KeyWrap)?;

    Ok(HybridCiphertext {
        encrypted_symmetric_key,
        encrypted_data,
    })
}

/// Unwrap the session key and AEAD-open `data` (nonce || ct+tag).
pub fn decrypt(
    private: &EncryptionPrivateKey,
    wrapped_key: &[u8],
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let unwrapped = Zeroizing::new(
        private
            .0
            .decrypt(Oaep::new::<Sha256>(), wrapped_key)
            .map_err(|_| CryptoError::KeyUnwrap)?,
    );
    if unwrapped.len() != 32 {
        return Err(CryptoError::KeyUnwrap);
    }
    let mut session_key = Zeroizing::new([0u8; 32]);
    session_key.copy_from_slice(&unwrapped);

    aead::decrypt(&session_key, data)
}

/// RSA-PSS signature over raw bytes. Returns the raw signature bytes.
pub fn sign(private: &SigningPrivateKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let signing_key = BlindedSigningKey::<Sha256>::new(private.0.clone());
    let signature = signing_key.sign_with_rng(&mut OsRng, data);
    Ok(signature.to_vec())
}

/// Verify an RSA-PSS signature over raw bytes.
pub fn verify(
    public: &SigningPublicKey,
    signature: &[u8],
    data: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::<Sha256>::new(public.0.clone());
    let signature =
        Signature::try_from(signature).map_err(|_| CryptoError::SignatureVerification)?;
    verifying_key
        .verify(data, &signature)
        .map_err(|_| CryptoError::SignatureVerification)
}
