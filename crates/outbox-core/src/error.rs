use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Storage error: {0}")]
    Storage(#[from] outbox_storage::StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] outbox_transport::TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid file payload: {0}")]
    InvalidPayload(String),
}

pub type OutboxResult<T> = Result<T, OutboxError>;
