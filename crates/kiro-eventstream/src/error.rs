use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventStreamError {
    #[error("event-stream buffer exceeded {0} bytes without a complete frame")]
    BufferOverflow(usize),
    #[error("prelude CRC mismatch")]
    PreludeCrcMismatch,
    #[error("message CRC mismatch")]
    MessageCrcMismatch,
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("unsupported header value type {0}, only string (7) is supported")]
    UnsupportedHeaderType(u8),
    #[error("header bytes are not valid UTF-8")]
    InvalidHeaderEncoding,

    #[error("invalid chunk payload JSON: {0}")]
    InvalidJson(String),
}

impl From<EventStreamError> for kiro_core::error::GatewayError {
    fn from(e: EventStreamError) -> Self {
        kiro_core::error::GatewayError::Upstream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EventStreamError>;
