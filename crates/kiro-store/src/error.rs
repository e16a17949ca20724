use thiserror::Error;

/// Errors that can occur talking to the shared key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("account not found: {uuid}")]
    AccountNotFound { uuid: String },

    #[error("token not found for account: {uuid}")]
    TokenNotFound { uuid: String },

    #[error("optimistic write conflict exhausted retries for key: {key}")]
    ConflictRetriesExhausted { key: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for kiro_core::error::GatewayError {
    fn from(e: StoreError) -> Self {
        kiro_core::error::GatewayError::Store(e.to_string())
    }
}
