//! Error taxonomy for the stack client.
//!
//! DESIGN
//! ======
//! Two layers. [`TransportError`] is produced by the transport primitives and
//! knows nothing about stack operations. [`StackError`] is what event
//! operations return: usage failures (not authorized, no files) stand on their
//! own, while transport failures are wrapped with the operation name and the
//! URL or event kind they were aimed at.
//!
//! Nothing in this crate retries. [`StackError::retryable`] only classifies.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

// =============================================================================
// HTTP STATUS FAILURES
// =============================================================================

/// Status class of a non-success HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 500 and above.
    Server,
    /// Any other non-success status.
    Other,
}

impl HttpErrorKind {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            s if s >= 500 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// A response was received but its status was not 2xx.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub status: u16,
    /// Parsed response body. Non-JSON bodies are kept as a JSON string, empty
    /// bodies as `null`.
    pub body: Value,
}

impl HttpError {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn kind(&self) -> HttpErrorKind {
        HttpErrorKind::from_status(self.status)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            HttpErrorKind::Unauthorized => f.write_str("Unauthorized"),
            HttpErrorKind::Forbidden => f.write_str("Forbidden"),
            HttpErrorKind::NotFound => f.write_str("Resource not found"),
            HttpErrorKind::Server => write!(f, "Server error: {}", self.status),
            HttpErrorKind::Other => write!(f, "Request failed with status {}: {}", self.status, self.body),
        }
    }
}

impl std::error::Error for HttpError {}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Failures raised by the REST and WebSocket transport primitives.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No response was received (DNS, connect, reset, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The request or handshake exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A response arrived with a non-success status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A success response could not be parsed.
    #[error("malformed response payload: {0}")]
    Decode(String),

    /// Send or receive was attempted without a live connection.
    #[error("websocket is not connected")]
    NotConnected,

    /// The remote side closed the connection while a reply was awaited.
    #[error("websocket connection closed")]
    Closed,

    /// The WebSocket upgrade was rejected or failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(Box<tokio_tungstenite::tungstenite::Error>),

    /// Reading or writing an open WebSocket failed.
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    /// The request could not be built (bad URL, unserializable body).
    #[error("invalid request to {url}: {message}")]
    InvalidRequest { url: String, message: String },

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl TransportError {
    /// Status-specific view of an HTTP failure, if this is one.
    #[must_use]
    pub fn http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Http(e) => match e.kind() {
                HttpErrorKind::Unauthorized => "E_HTTP_UNAUTHORIZED",
                HttpErrorKind::Forbidden => "E_HTTP_FORBIDDEN",
                HttpErrorKind::NotFound => "E_HTTP_NOT_FOUND",
                HttpErrorKind::Server => "E_HTTP_SERVER",
                HttpErrorKind::Other => "E_HTTP",
            },
            Self::Decode(_) => "E_DECODE",
            Self::NotConnected => "E_NOT_CONNECTED",
            Self::Closed => "E_CLOSED",
            Self::Handshake(_) => "E_HANDSHAKE",
            Self::WebSocket(_) => "E_WEBSOCKET",
            Self::InvalidHeader { .. } => "E_INVALID_HEADER",
            Self::InvalidRequest { .. } => "E_INVALID_REQUEST",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Closed | Self::WebSocket(_) => true,
            Self::Http(e) => e.status == 429 || e.status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Self::InvalidRequest {
                url: error.url().map(ToString::to_string).unwrap_or_default(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

// =============================================================================
// STACK OPERATIONS
// =============================================================================

/// Failures returned by [`crate::StackEvent`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// An operation that needs a session was called before `authorize_stack`.
    #[error("no active session; call authorize_stack first")]
    NotAuthorized,

    /// `authorize_stack` got a response without an access token.
    #[error("authorization failed: no access token received")]
    Authorization,

    /// `store_data` had nothing left to send after dropping unreadable paths.
    #[error("no valid files to store")]
    NoValidFiles,

    /// The WebSocket produced no reply for an operation.
    #[error("no reply received for {event} event")]
    EmptyReply { event: frames::EventKind },

    /// A request body could not be encoded, or a reply did not have the
    /// expected shape.
    #[error("{operation}: {source}")]
    Codec {
        operation: &'static str,
        #[source]
        source: frames::CodecError,
    },

    /// A transport failure, tagged with the operation and its target.
    #[error("{operation} failed against {target}: {source}")]
    Transport {
        operation: &'static str,
        target: String,
        #[source]
        source: TransportError,
    },
}

impl StackError {
    pub(crate) fn transport(operation: &'static str, target: impl Into<String>, source: TransportError) -> Self {
        Self::Transport { operation, target: target.into(), source }
    }

    /// The underlying transport failure, if any.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAuthorized => "E_NOT_AUTHORIZED",
            Self::Authorization => "E_AUTHORIZATION",
            Self::NoValidFiles => "E_NO_VALID_FILES",
            Self::EmptyReply { .. } => "E_EMPTY_REPLY",
            Self::Codec { .. } => "E_CODEC",
            Self::Transport { source, .. } => source.error_code(),
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
