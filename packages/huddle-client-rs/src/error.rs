//! Error types for the Huddle client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP response had a non-2xx status code.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// An error from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An error from the WebSocket layer.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The signaling transport was not connected.
    #[error("Transport is not connected")]
    NotConnected,

    /// Reconnection attempts were exhausted; manual reset required.
    #[error("Reconnection attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    /// A peer session received an event its state does not allow.
    #[error("Invalid negotiation state: {0}")]
    InvalidState(String),

    /// An error reported by the underlying media transport.
    #[error("Media transport error: {0}")]
    Media(String),

    /// A generic error string.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
