//! Errors raised while validating and translating client payloads.

use thiserror::Error;

use super::ProxyError;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("messages must contain at least one message with a role")]
    EmptyMessages,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<RequestError> for ProxyError {
    fn from(err: RequestError) -> Self {
        Self::invalid_request(err.to_string())
    }
}
