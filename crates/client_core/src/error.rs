use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{0}")]
    Api(ApiError),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
    #[error("realtime channel closed")]
    ChannelClosed,
    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Api(err) => err.code,
            StoreError::Network(_) | StoreError::ChannelClosed => ErrorCode::Network,
            StoreError::Timeout(_) => ErrorCode::Timeout,
            StoreError::Decode { .. } => ErrorCode::Internal,
            StoreError::Config(_) => ErrorCode::Validation,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code().is_transient()
    }

    pub(crate) fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            what,
            reason: err.to_string(),
        }
    }
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        StoreError::Api(err)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(err.to_string())
        } else if err.is_decode() {
            StoreError::decode("response body", err)
        } else if let Some(status) = err.status() {
            StoreError::Api(ApiError::new(
                ErrorCode::from_http_status(status.as_u16()),
                err.to_string(),
            ))
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StoreError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => StoreError::ChannelClosed,
            WsError::Http(response) => StoreError::Api(ApiError::new(
                ErrorCode::from_http_status(response.status().as_u16()),
                format!("realtime upgrade rejected with {}", response.status()),
            )),
            other => StoreError::Network(other.to_string()),
        }
    }
}
