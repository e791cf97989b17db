//! Error taxonomy shared by reads and writes.
//!
//! `RequestError` is cloneable so a single fetch outcome can be handed to every
//! caller that joined the same in-flight request.

use std::error::Error as StdError;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestError {
    /// The server could not be reached; no response exists.
    #[error("network error: {message}")]
    Network { message: String },
    /// The server answered with a non-success status. `message` is the body verbatim.
    #[error("request rejected with status {status}: {message}")]
    Http { status: u16, message: String },
    /// The server answered but the body could not be interpreted.
    #[error("failed to decode response: {message}")]
    Decode { message: String },
}

impl RequestError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for 4xx responses: the server rejected the input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }

    /// Only transport failures may be retried by the user; nothing retries automatically.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Text suitable for showing to a person.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network { .. } => "Could not reach the server. Please try again.".to_string(),
            Self::Http { message, .. } => message.clone(),
            Self::Decode { .. } => "The server sent an unexpected response.".to_string(),
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}

/// Flattened `source()` chain of an error, used for CLI and log output.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}
