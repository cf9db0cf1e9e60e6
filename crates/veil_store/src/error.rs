use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Invalid stored identity: {0}")]
    Identity(#[from] veil_proto::ProtoError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid status value: {0}")]
    InvalidStatus(String),

    #[error("Migration error: {0}")]
    Migration(String),
}
