use thiserror::Error;

/// Errors surfaced to the gateway's dispatch loop and, ultimately, to a
/// client as a Claude-shaped `{type:"error", error:{type, message}}` body.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request too large: {0}")]
    RequestTooLarge(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("No healthy accounts available")]
    Overloaded,

    #[error("Upstream error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Upstream transport error: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code to return to the client.
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Config(_) => 500,
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Authentication(_) => 401,
            GatewayError::RequestTooLarge(_) => 413,
            GatewayError::RateLimit(_) => 429,
            GatewayError::Overloaded => 503,
            GatewayError::Api { .. } => 500,
            GatewayError::Store(_) => 500,
            GatewayError::Upstream(_) => 500,
            GatewayError::Serialization(_) => 500,
            GatewayError::Io(_) => 500,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Claude's `error.type` string.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "api_error",
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::Authentication(_) => "authentication_error",
            GatewayError::RequestTooLarge(_) => "request_too_large",
            GatewayError::RateLimit(_) => "rate_limit_error",
            GatewayError::Overloaded => "overloaded_error",
            GatewayError::Api { .. } => "api_error",
            GatewayError::Store(_) => "api_error",
            GatewayError::Upstream(_) => "api_error",
            GatewayError::Serialization(_) => "api_error",
            GatewayError::Io(_) => "api_error",
            GatewayError::Internal(_) => "api_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
