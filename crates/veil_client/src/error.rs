use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] veil_crypto::CryptoError),

    #[error("Protocol error: {0}")]
    Proto(#[from] veil_proto::ProtoError),

    #[error("Storage error: {0}")]
    Storage(#[from] veil_store::StoreError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity resolution failed for {0:?}")]
    Unresolvable(String),

    #[error("Device link error: {0}")]
    Link(String),
}
