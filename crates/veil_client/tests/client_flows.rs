//! End-to-end flows over the client core with in-memory collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use veil_client::{
    build_link_offer, parse_qr_code, ClientError, DenyReason, EnvelopeProtocol, GateDecision,
    Gatekeeper, IdentityResolver, KeyCache, KeyDirectory, LinkHandshake, LinkOutcome, LinkStage,
    SyncOfferSource, TrustStore,
};
use veil_crypto::{engine, CryptoError, PrivateKeyBundle, PublicKeyBundle};
use veil_proto::{Priority, SecureEnvelope, TransportMessage, Urn};
use veil_store::Store;

// ── Mocks ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockDirectory {
    keys: Mutex<HashMap<String, PublicKeyBundle>>,
    fetches: AtomicUsize,
}

impl MockDirectory {
    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyDirectory for MockDirectory {
    async fn fetch_keys(&self, urn: &Urn) -> Result<PublicKeyBundle, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap()
            .get(&urn.to_string())
            .cloned()
            .ok_or_else(|| ClientError::Network(format!("no keys published for {urn}")))
    }

    async fn publish_keys(&self, urn: &Urn, keys: &PublicKeyBundle) -> Result<(), ClientError> {
        self.keys
            .lock()
            .unwrap()
            .insert(urn.to_string(), keys.clone());
        Ok(())
    }
}

/// Directory that always fails, for fail-closed checks.
struct DeadDirectory;

#[async_trait]
impl KeyDirectory for DeadDirectory {
    async fn fetch_keys(&self, _urn: &Urn) -> Result<PublicKeyBundle, ClientError> {
        Err(ClientError::Network("directory unreachable".into()))
    }

    async fn publish_keys(&self, _urn: &Urn, _keys: &PublicKeyBundle) -> Result<(), ClientError> {
        Err(ClientError::Network("directory unreachable".into()))
    }
}

struct CountingResolver {
    mapping: HashMap<String, Urn>,
    calls: AtomicUsize,
}

impl CountingResolver {
    fn new(pairs: &[(&str, &Urn)]) -> Self {
        Self {
            mapping: pairs
                .iter()
                .map(|(h, u)| (h.to_string(), (*u).clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityResolver for CountingResolver {
    async fn resolve_handle(&self, wire_handle: &str) -> Result<Urn, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mapping
            .get(wire_handle)
            .cloned()
            .ok_or_else(|| ClientError::Unresolvable(wire_handle.to_string()))
    }

    async fn current_handle(&self, urn: &Urn) -> Result<String, ClientError> {
        self.mapping
            .iter()
            .find(|(_, u)| *u == urn)
            .map(|(h, _)| h.clone())
            .ok_or_else(|| ClientError::Unresolvable(urn.to_string()))
    }
}

struct StaticTrust {
    trusted: HashSet<String>,
}

impl StaticTrust {
    fn new(trusted: &[&Urn]) -> Self {
        Self {
            trusted: trusted.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TrustStore for StaticTrust {
    async fn is_trusted(&self, urn: &Urn) -> Result<bool, ClientError> {
        Ok(self.trusted.contains(&urn.to_string()))
    }
}

/// Offer source the "existing device" posts into and the poll loop
/// reads from.
#[derive(Default)]
struct OfferBoard {
    offers: Mutex<HashMap<String, SecureEnvelope>>,
}

impl OfferBoard {
    fn post(&self, session_id: &str, envelope: SecureEnvelope) {
        self.offers
            .lock()
            .unwrap()
            .insert(session_id.to_string(), envelope);
    }
}

#[async_trait]
impl SyncOfferSource for OfferBoard {
    async fn poll_offer(
        &self,
        session_id: &str,
    ) -> Result<Option<SecureEnvelope>, ClientError> {
        Ok(self.offers.lock().unwrap().get(session_id).cloned())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn new_identity() -> PrivateKeyBundle {
    let (_, enc) = engine::generate_encryption_keys().unwrap();
    let (_, sig) = engine::generate_signing_keys().unwrap();
    PrivateKeyBundle { enc, sig }
}

fn transport_message(handle: &str, payload: &[u8]) -> TransportMessage {
    TransportMessage {
        sender_id: handle.to_string(),
        sent_timestamp: Utc::now(),
        type_id: 1,
        payload_bytes: payload.to_vec(),
        client_record_id: Some("rec-1".into()),
    }
}

async fn cache_with_directory() -> (KeyCache, Arc<MockDirectory>) {
    let store = Store::open_in_memory().await.unwrap();
    let directory = Arc::new(MockDirectory::default());
    (KeyCache::new(store, directory.clone()), directory)
}

// ── Envelope protocol ────────────────────────────────────────────────────────

#[tokio::test]
async fn envelope_roundtrip_between_two_identities() {
    let (cache, _) = cache_with_directory().await;
    let protocol = EnvelopeProtocol::new(cache.clone());

    let alice = Urn::user("alice").unwrap();
    let bob = Urn::user("bob").unwrap();
    let alice_keys = new_identity();
    let bob_keys = new_identity();
    cache.store_keys(&alice, &alice_keys.public_bundle().unwrap()).await.unwrap();
    cache.store_keys(&bob, &bob_keys.public_bundle().unwrap()).await.unwrap();

    let message = transport_message("alice-handle", b"hello bob");
    let envelope = protocol
        .encrypt_and_sign(&message, &bob, &alice_keys, Priority::Interactive)
        .await
        .unwrap();

    assert_eq!(envelope.recipient_id, bob);
    assert!(!envelope.signature.is_empty());
    assert_eq!(envelope.priority, Some(Priority::Interactive));

    // Bob's side: verify against Alice's published signing key.
    let received = protocol
        .verify_and_decrypt(&envelope, &alice, &bob_keys)
        .await
        .unwrap();
    assert_eq!(received, message);
}

#[tokio::test]
async fn tampered_envelope_fails_signature_check_before_decryption() {
    let (cache, _) = cache_with_directory().await;
    let protocol = EnvelopeProtocol::new(cache.clone());

    let alice = Urn::user("alice").unwrap();
    let bob = Urn::user("bob").unwrap();
    let alice_keys = new_identity();
    let bob_keys = new_identity();
    cache.store_keys(&alice, &alice_keys.public_bundle().unwrap()).await.unwrap();
    cache.store_keys(&bob, &bob_keys.public_bundle().unwrap()).await.unwrap();

    let mut envelope = protocol
        .encrypt_and_sign(
            &transport_message("alice-handle", b"payload"),
            &bob,
            &alice_keys,
            Priority::Interactive,
        )
        .await
        .unwrap();
    envelope.encrypted_data[0] ^= 0x01;

    // The signature covers the ciphertext, so tampering surfaces as a
    // verification failure rather than an AEAD error.
    let err = protocol
        .verify_and_decrypt(&envelope, &alice, &bob_keys)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Crypto(CryptoError::SignatureVerification)
    ));
}

#[tokio::test]
async fn wrong_sender_identity_fails_verification() {
    let (cache, _) = cache_with_directory().await;
    let protocol = EnvelopeProtocol::new(cache.clone());

    let alice = Urn::user("alice").unwrap();
    let eve = Urn::user("eve").unwrap();
    let bob = Urn::user("bob").unwrap();
    let alice_keys = new_identity();
    let eve_keys = new_identity();
    let bob_keys = new_identity();
    cache.store_keys(&alice, &alice_keys.public_bundle().unwrap()).await.unwrap();
    cache.store_keys(&eve, &eve_keys.public_bundle().unwrap()).await.unwrap();
    cache.store_keys(&bob, &bob_keys.public_bundle().unwrap()).await.unwrap();

    let envelope = protocol
        .encrypt_and_sign(
            &transport_message("eve-handle", b"spoof"),
            &bob,
            &eve_keys,
            Priority::Interactive,
        )
        .await
        .unwrap();

    // Claiming the message came from Alice must fail.
    assert!(protocol
        .verify_and_decrypt(&envelope, &alice, &bob_keys)
        .await
        .is_err());
}

#[tokio::test]
async fn fingerprint_matches_published_bundle() {
    let (cache, _) = cache_with_directory().await;
    let protocol = EnvelopeProtocol::new(cache.clone());

    let alice = Urn::user("alice").unwrap();
    let bundle = new_identity().public_bundle().unwrap();
    cache.store_keys(&alice, &bundle).await.unwrap();

    let fp = protocol.get_fingerprint(&alice).await.unwrap();
    assert_eq!(fp, bundle.fingerprint().unwrap());
}

// ── Key cache ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_cache_entry_skips_the_directory() {
    let (cache, directory) = cache_with_directory().await;
    let alice = Urn::user("alice").unwrap();
    let bundle = new_identity().public_bundle().unwrap();
    directory.publish_keys(&alice, &bundle).await.unwrap();

    let first = cache.get_public_key(&alice).await.unwrap();
    let second = cache.get_public_key(&alice).await.unwrap();
    assert_eq!(first, bundle);
    assert_eq!(second, bundle);
    // Second read is served from the cache.
    assert_eq!(directory.fetch_count(), 1);
}

#[tokio::test]
async fn stale_cache_entry_triggers_a_directory_refetch() {
    let store = Store::open_in_memory().await.unwrap();
    let directory = Arc::new(MockDirectory::default());
    let cache = KeyCache::new(store.clone(), directory.clone());
    let alice = Urn::user("alice").unwrap();

    let old = PublicKeyBundle { enc_key: "enc-old".into(), sig_key: "sig-old".into() };
    let fresh = PublicKeyBundle { enc_key: "enc-new".into(), sig_key: "sig-new".into() };
    directory.publish_keys(&alice, &fresh).await.unwrap();
    // Entry aged past the 16 h TTL.
    store
        .cache_keys_at(&alice, &old, Utc::now() - Duration::hours(17))
        .await
        .unwrap();

    let got = cache.get_public_key(&alice).await.unwrap();
    assert_eq!(got, fresh);
    assert_eq!(directory.fetch_count(), 1);

    // The refetch wrote through with a fresh timestamp.
    let entry = store.cached_keys(&alice).await.unwrap().unwrap();
    assert_eq!(entry.keys, fresh);
    assert!(Utc::now() - entry.timestamp < Duration::minutes(1));
}

#[tokio::test]
async fn has_keys_fails_closed_when_directory_is_down() {
    let store = Store::open_in_memory().await.unwrap();
    let cache = KeyCache::new(store, Arc::new(DeadDirectory));
    let alice = Urn::user("alice").unwrap();

    assert!(!cache.has_keys(&alice).await);
}

#[tokio::test]
async fn reset_keys_publishes_a_new_bundle() {
    let (cache, directory) = cache_with_directory().await;
    let alice = Urn::user("alice").unwrap();
    let old = new_identity().public_bundle().unwrap();
    cache.store_keys(&alice, &old).await.unwrap();

    let fresh = cache.reset_keys(&alice).await.unwrap();
    let published = directory.fetch_keys(&alice).await.unwrap();
    assert_eq!(published, fresh.public_bundle().unwrap());
    assert_ne!(published, old);

    // The cache serves the new bundle too.
    assert_eq!(cache.get_public_key(&alice).await.unwrap(), published);
}

// ── Gatekeeper ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn blocked_sender_is_dropped_without_resolution_or_storage() {
    let store = Store::open_in_memory().await.unwrap();
    let alice = Urn::user("alice").unwrap();
    let resolver = Arc::new(CountingResolver::new(&[("blocked-handle", &alice)]));
    let gate = Gatekeeper::new(resolver.clone(), Arc::new(StaticTrust::new(&[])), store.clone());

    let blocked: HashSet<String> = ["blocked-handle".to_string()].into();
    let decision = gate
        .process(&transport_message("blocked-handle", b"ct"), &blocked)
        .await
        .unwrap();

    assert_eq!(decision, GateDecision::Denied { reason: DenyReason::Blocked });
    assert_eq!(resolver.call_count(), 0);
    assert!(store.quarantined_senders().await.unwrap().is_empty());
}

#[tokio::test]
async fn trusted_sender_is_allowed_through() {
    let store = Store::open_in_memory().await.unwrap();
    let alice = Urn::user("alice").unwrap();
    let resolver = Arc::new(CountingResolver::new(&[("alice-handle", &alice)]));
    let gate = Gatekeeper::new(
        resolver.clone(),
        Arc::new(StaticTrust::new(&[&alice])),
        store.clone(),
    );

    let decision = gate
        .process(&transport_message("alice-handle", b"ct"), &HashSet::new())
        .await
        .unwrap();

    assert_eq!(decision, GateDecision::Allowed { sender: alice });
    assert_eq!(resolver.call_count(), 1);
    assert!(store.quarantined_senders().await.unwrap().is_empty());
}

#[tokio::test]
async fn untrusted_sender_is_quarantined_with_payload_intact() {
    let store = Store::open_in_memory().await.unwrap();
    let mallory = Urn::user("mallory").unwrap();
    let resolver = Arc::new(CountingResolver::new(&[("m-handle", &mallory)]));
    let gate = Gatekeeper::new(resolver, Arc::new(StaticTrust::new(&[])), store.clone());

    let ciphertext = vec![0xAA, 0xBB, 0xCC];
    let decision = gate
        .process(&transport_message("m-handle", &ciphertext), &HashSet::new())
        .await
        .unwrap();
    assert_eq!(decision, GateDecision::Denied { reason: DenyReason::Untrusted });

    assert_eq!(gate.pending_requests().await.unwrap(), vec![mallory.clone()]);
    let held = gate.retrieve_for_inspection(&mallory).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].payload_bytes, ciphertext);

    assert_eq!(gate.reject(&mallory).await.unwrap(), 1);
    assert!(gate.pending_requests().await.unwrap().is_empty());
}

// ── Device linking ───────────────────────────────────────────────────────────

#[tokio::test]
async fn receiver_hosted_link_delivers_the_key_bundle() {
    let board = Arc::new(OfferBoard::default());
    let handshake = LinkHandshake::new(board.clone());

    let (qr, rx) = handshake.begin_receiver_hosted().unwrap();
    assert!(matches!(handshake.stage(), LinkStage::Linking(_)));

    // Existing device: scan the QR and post the encrypted offer.
    let identity = new_identity();
    let expected = identity.public_bundle().unwrap();
    let scanned = parse_qr_code(&qr).unwrap();
    let session_id = match &scanned {
        veil_client::ParsedQr::Receiver { session_id, .. } => session_id.clone(),
        _ => panic!("expected receiver-hosted QR"),
    };
    board.post(&session_id, build_link_offer(&scanned, &identity).unwrap());

    match rx.await.unwrap() {
        LinkOutcome::Linked(bundle) => {
            assert_eq!(bundle.public_bundle().unwrap(), expected);
        }
        LinkOutcome::Expired => panic!("session should not expire"),
    }
    assert_eq!(handshake.stage(), LinkStage::Complete);
}

#[tokio::test]
async fn sender_hosted_link_delivers_the_key_bundle() {
    let board = Arc::new(OfferBoard::default());
    let handshake = LinkHandshake::new(board.clone());

    // Existing device: show the QR, post the offer.
    let identity = new_identity();
    let expected = identity.public_bundle().unwrap();
    let session = veil_client::SenderSession::generate().unwrap();
    board.post(&session.session_id, session.build_offer(&identity).unwrap());

    // New device: scan and poll.
    let rx = handshake.begin_from_scan(&session.qr_string).unwrap();
    match rx.await.unwrap() {
        LinkOutcome::Linked(bundle) => {
            assert_eq!(bundle.public_bundle().unwrap(), expected);
        }
        LinkOutcome::Expired => panic!("session should not expire"),
    }
    assert_eq!(handshake.stage(), LinkStage::Complete);
}

#[tokio::test]
async fn scanning_a_receiver_code_cannot_start_a_poll() {
    let handshake = LinkHandshake::new(Arc::new(OfferBoard::default()));
    let (qr, _rx) = handshake.begin_receiver_hosted().unwrap();

    let other = LinkHandshake::new(Arc::new(OfferBoard::default()));
    assert!(matches!(other.begin_from_scan(&qr), Err(ClientError::Link(_))));
}

#[tokio::test(start_paused = true)]
async fn link_session_expires_into_reset_warning() {
    let handshake = LinkHandshake::new(Arc::new(OfferBoard::default()));
    let (_qr, rx) = handshake.begin_receiver_hosted().unwrap();

    // No offer ever arrives; paused time fast-forwards past the TTL.
    assert!(matches!(rx.await.unwrap(), LinkOutcome::Expired));
    assert_eq!(handshake.stage(), LinkStage::ResetWarning);

    handshake.acknowledge_reset();
    assert_eq!(handshake.stage(), LinkStage::Choice);
}

#[tokio::test]
async fn starting_a_new_session_cancels_the_previous_poller() {
    let board = Arc::new(OfferBoard::default());
    let handshake = LinkHandshake::new(board.clone());

    let (_qr1, rx1) = handshake.begin_receiver_hosted().unwrap();
    let (qr2, rx2) = handshake.begin_receiver_hosted().unwrap();

    // First channel closes without an outcome.
    assert!(rx1.await.is_err());

    let identity = new_identity();
    let scanned = parse_qr_code(&qr2).unwrap();
    let session_id = match &scanned {
        veil_client::ParsedQr::Receiver { session_id, .. } => session_id.clone(),
        _ => panic!("expected receiver-hosted QR"),
    };
    board.post(&session_id, build_link_offer(&scanned, &identity).unwrap());

    assert!(matches!(rx2.await.unwrap(), LinkOutcome::Linked(_)));
}
