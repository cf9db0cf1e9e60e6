use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid QR payload: {0}")]
    InvalidQrFormat(String),

    #[error("Unknown QR link mode: {0:?}")]
    UnknownQrMode(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
