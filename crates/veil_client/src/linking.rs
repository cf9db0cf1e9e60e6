//! QR device-link handshake.
//!
//! Two modes, selected by whoever shows the QR code:
//!
//! - **Receiver-hosted** (`rh`): the NEW device shows a QR carrying an
//!   ephemeral RSA public key. The existing device scans it and posts
//!   the key bundle encrypted to that public key.
//! - **Sender-hosted** (`sh`): the EXISTING device shows a QR carrying
//!   a one-time AES key. The new device scans it and waits for the
//!   bundle encrypted under that key.
//!
//! In both modes the waiting side is the new device: [`LinkHandshake`]
//! runs at most ONE polling loop, bounded by the session TTL. Starting
//! a new session cancels the previous loop; a session that expires
//! moves the stage to [`LinkStage::ResetWarning`] so the UI can tell
//! the user the code is dead before offering a fresh one.
//!
//! Sync envelopes here are unsigned and ephemeral: authenticity comes
//! from possession of the QR secret and integrity from the AEAD tag.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;
use zeroize::Zeroizing;

use veil_crypto::{aead, engine, EncryptionPrivateKey, EncryptionPublicKey, PrivateKeyBundle};
use veil_proto::{LinkMode, QrPayload, SecureEnvelope};

use crate::error::ClientError;
use crate::protocol::{decrypt_sync_message, encrypt_sync_message, SyncDecryptKey, SyncKey};
use crate::traits::SyncOfferSource;

/// A link session dies this long after its QR is generated.
pub const LINK_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Where the handshake currently is, for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    /// No session in progress.
    Choice,
    /// A session is live and polling.
    Linking(LinkMode),
    /// A key bundle arrived and was installed.
    Complete,
    /// The session expired; the user must be warned before retrying.
    ResetWarning,
}

/// Terminal result of one link session.
pub enum LinkOutcome {
    Linked(PrivateKeyBundle),
    Expired,
}

/// A scanned QR, decoded into typed key material.
pub enum ParsedQr {
    /// Receiver-hosted code: the peer's ephemeral public key. The
    /// scanner (existing device) responds with an encrypted offer.
    Receiver {
        session_id: String,
        public_key: EncryptionPublicKey,
    },
    /// Sender-hosted code: the shared one-time key. The scanner (new
    /// device) polls for the offer.
    Sender {
        session_id: String,
        one_time_key: Zeroizing<[u8; 32]>,
    },
}

/// Decode and validate a scanned QR string. The mode tag is checked
/// before any key material is touched.
pub fn parse_qr_code(qr: &str) -> Result<ParsedQr, ClientError> {
    let (payload, mode) = QrPayload::parse(qr)?;
    match mode {
        LinkMode::ReceiverHosted => Ok(ParsedQr::Receiver {
            public_key: EncryptionPublicKey::from_der(&payload.key_bytes()?)?,
            session_id: payload.s,
        }),
        LinkMode::SenderHosted => {
            let bytes = Zeroizing::new(payload.key_bytes()?);
            if bytes.len() != 32 {
                return Err(ClientError::Link(format!(
                    "one-time key must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
            let mut key = Zeroizing::new([0u8; 32]);
            key.copy_from_slice(&bytes);
            Ok(ParsedQr::Sender {
                session_id: payload.s,
                one_time_key: key,
            })
        }
    }
}

/// Build the offer envelope after scanning a peer's QR. Used by the
/// device that already holds the identity keys.
pub fn build_link_offer(
    scanned: &ParsedQr,
    keys: &PrivateKeyBundle,
) -> Result<SecureEnvelope, ClientError> {
    let bundle_bytes = keys.to_sync_bytes()?;
    match scanned {
        ParsedQr::Receiver { session_id, public_key } => encrypt_sync_message(
            &bundle_bytes,
            session_id,
            &SyncKey::Asymmetric(public_key.clone()),
        ),
        ParsedQr::Sender { session_id, one_time_key } => encrypt_sync_message(
            &bundle_bytes,
            session_id,
            &SyncKey::Symmetric(one_time_key.clone()),
        ),
    }
}

/// Existing-device side of a sender-hosted session: owns the one-time
/// key and renders the QR for the new device to scan.
pub struct SenderSession {
    pub session_id: String,
    pub qr_string: String,
    one_time_key: Zeroizing<[u8; 32]>,
}

impl SenderSession {
    pub fn generate() -> Result<Self, ClientError> {
        let session_id = Uuid::new_v4().to_string();
        let one_time_key = aead::generate_key();
        let qr_string = QrPayload::new(
            &session_id,
            URL_SAFE_NO_PAD.encode(one_time_key.as_slice()),
            LinkMode::SenderHosted,
        )
        .encode()?;
        Ok(Self { session_id, qr_string, one_time_key })
    }

    /// Encrypt the identity bundle for the device that scanned this QR.
    pub fn build_offer(&self, keys: &PrivateKeyBundle) -> Result<SecureEnvelope, ClientError> {
        encrypt_sync_message(
            &keys.to_sync_bytes()?,
            &self.session_id,
            &SyncKey::Symmetric(self.one_time_key.clone()),
        )
    }
}

enum PollKey {
    Asymmetric(EncryptionPrivateKey),
    Symmetric(Zeroizing<[u8; 32]>),
}

/// New-device side of the handshake: the state machine plus the single
/// polling loop.
pub struct LinkHandshake {
    offers: Arc<dyn SyncOfferSource>,
    stage: Arc<Mutex<LinkStage>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl LinkHandshake {
    pub fn new(offers: Arc<dyn SyncOfferSource>) -> Self {
        Self {
            offers,
            stage: Arc::new(Mutex::new(LinkStage::Choice)),
            poller: Mutex::new(None),
        }
    }

    pub fn stage(&self) -> LinkStage {
        *lock(&self.stage)
    }

    /// Start a receiver-hosted session: generate an ephemeral keypair,
    /// return the QR string to display, and poll for the offer. The
    /// outcome arrives on the returned channel.
    pub fn begin_receiver_hosted(
        &self,
    ) -> Result<(String, oneshot::Receiver<LinkOutcome>), ClientError> {
        let session_id = Uuid::new_v4().to_string();
        let (public, private) = engine::generate_encryption_keys()?;
        let qr_string =
            QrPayload::new(&session_id, public.to_b64()?, LinkMode::ReceiverHosted).encode()?;

        let rx = self.start_session(
            session_id,
            LinkMode::ReceiverHosted,
            PollKey::Asymmetric(private),
        );
        Ok((qr_string, rx))
    }

    /// Join a sender-hosted session from a scanned QR and poll for the
    /// offer. Fails if the code is receiver-hosted — that mode's
    /// scanner sends, it does not poll.
    pub fn begin_from_scan(
        &self,
        qr: &str,
    ) -> Result<oneshot::Receiver<LinkOutcome>, ClientError> {
        match parse_qr_code(qr)? {
            ParsedQr::Sender { session_id, one_time_key } => Ok(self.start_session(
                session_id,
                LinkMode::SenderHosted,
                PollKey::Symmetric(one_time_key),
            )),
            ParsedQr::Receiver { .. } => Err(ClientError::Link(
                "scanned a receiver-hosted code; respond with an offer instead of polling".into(),
            )),
        }
    }

    /// Abandon the current session, if any.
    pub fn cancel(&self) {
        self.abort_poller();
        *lock(&self.stage) = LinkStage::Choice;
    }

    /// Clear the expiry warning after the UI has shown it.
    pub fn acknowledge_reset(&self) {
        let mut stage = lock(&self.stage);
        if *stage == LinkStage::ResetWarning {
            *stage = LinkStage::Choice;
        }
    }

    fn start_session(
        &self,
        session_id: String,
        mode: LinkMode,
        key: PollKey,
    ) -> oneshot::Receiver<LinkOutcome> {
        self.abort_poller();
        *lock(&self.stage) = LinkStage::Linking(mode);

        let (tx, rx) = oneshot::channel();
        let offers = Arc::clone(&self.offers);
        let stage = Arc::clone(&self.stage);

        let handle = tokio::spawn(async move {
            let outcome = poll_for_offer(offers.as_ref(), &session_id, &key).await;
            match &outcome {
                LinkOutcome::Linked(_) => {
                    tracing::info!(session = %session_id, "device link complete");
                    *lock(&stage) = LinkStage::Complete;
                }
                LinkOutcome::Expired => {
                    tracing::warn!(session = %session_id, "link session expired");
                    *lock(&stage) = LinkStage::ResetWarning;
                }
            }
            // Receiver may have been dropped; the stage already records
            // the result.
            let _ = tx.send(outcome);
        });
        *lock(&self.poller) = Some(handle);
        rx
    }

    fn abort_poller(&self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
    }
}

impl Drop for LinkHandshake {
    fn drop(&mut self) {
        self.abort_poller();
    }
}

async fn poll_for_offer(
    offers: &dyn SyncOfferSource,
    session_id: &str,
    key: &PollKey,
) -> LinkOutcome {
    let deadline = tokio::time::Instant::now() + LINK_SESSION_TTL;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        if tokio::time::timeout_at(deadline, ticker.tick()).await.is_err() {
            return LinkOutcome::Expired;
        }

        let envelope = match offers.poll_offer(session_id).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "offer poll failed, retrying");
                continue;
            }
        };

        match open_offer(&envelope, key) {
            Ok(bundle) => return LinkOutcome::Linked(bundle),
            Err(e) => {
                // A bad offer does not kill the session; the peer may
                // retry before the deadline.
                tracing::warn!(session = %session_id, error = %e, "rejected malformed offer");
            }
        }
    }
}

fn open_offer(envelope: &SecureEnvelope, key: &PollKey) -> Result<PrivateKeyBundle, ClientError> {
    let plaintext = match key {
        PollKey::Asymmetric(private) => {
            decrypt_sync_message(envelope, &SyncDecryptKey::Asymmetric(private))?
        }
        PollKey::Symmetric(one_time_key) => {
            decrypt_sync_message(envelope, &SyncDecryptKey::Symmetric(one_time_key))?
        }
    };
    Ok(PrivateKeyBundle::from_sync_bytes(&plaintext)?)
}

/// Mutex poisoning cannot happen here (no panics while holding the
/// guard), so recover the guard rather than propagate.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
