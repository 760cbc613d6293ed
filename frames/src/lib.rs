//! Shared wire model and JSON codec for the stack protocol.
//!
//! This crate owns the request/response bodies used by both the REST and the
//! WebSocket transports. REST sends the bodies directly; WebSocket wraps them
//! in an [`Envelope`] tagged with an [`EventKind`].
//!
//! DESIGN
//! ======
//! - Envelope payloads stay flexible (`serde_json::Value`) so each event kind
//!   can carry its own body shape without a per-kind envelope type.
//! - REST routing for each kind is fixed here ([`EventKind::rest_route`]) so
//!   both transports agree on one table.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error returned by the JSON codec helpers.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload could not be serialized to JSON text.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    /// The text could not be decoded into the expected shape.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

// =============================================================================
// EVENT KIND
// =============================================================================

/// Discriminator for the logical operation a WebSocket message represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// Bootstrap the stack session.
    Init,
    /// Ask the stack a question.
    Query,
    /// Upload a batch of documents.
    Store,
    /// Tear the stack session down.
    Close,
}

/// Path and optional `action` query parameter a kind maps to over REST.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestRoute {
    pub path: &'static str,
    pub action: Option<&'static str>,
}

impl EventKind {
    /// Wire name of the kind, e.g. `"QUERY"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Query => "QUERY",
            Self::Store => "STORE",
            Self::Close => "CLOSE",
        }
    }

    /// The fixed REST endpoint for this kind.
    #[must_use]
    pub fn rest_route(self) -> RestRoute {
        match self {
            Self::Init => RestRoute { path: "/sessions", action: Some("init") },
            Self::Query => RestRoute { path: "/queries", action: None },
            Self::Store => RestRoute { path: "/documents", action: None },
            Self::Close => RestRoute { path: "/sessions", action: Some("close") },
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A single request on the WebSocket wire: `{ "event": KIND, "data": {...} }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from any serializable body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the body cannot be represented as JSON.
    pub fn new(event: EventKind, data: &impl Serialize) -> Result<Self, CodecError> {
        let data = serde_json::to_value(data).map_err(CodecError::Encode)?;
        Ok(Self { event, data })
    }
}

/// Encode an envelope as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(CodecError::Encode)
}

/// Decode an envelope from JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON or an unknown event kind.
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

// =============================================================================
// REQUEST BODIES
// =============================================================================

/// Body of `POST /auth`. Absent fields are left out of the JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Body of the session and query operations. A missing query is sent as `{}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(query: Option<String>) -> Self {
        Self { query }
    }
}

/// One document in a store batch. `content` is standard base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObject {
    pub name: String,
    pub content: String,
}

/// Body of the store operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentsRequest {
    pub files: Vec<FileObject>,
    pub metadata: Map<String, Value>,
}

// =============================================================================
// RESPONSE BODIES
// =============================================================================

/// Body returned by `POST /auth`.
///
/// `access_token` is optional on the wire so a missing token can be reported
/// as an authorization failure instead of a decode failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl SessionResponse {
    /// The access token, treating an empty string as absent.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|token| !token.is_empty())
    }
}

/// Body returned by every non-auth operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericResponse {
    pub result: String,
}

impl GenericResponse {
    #[must_use]
    pub fn new(result: impl Into<String>) -> Self {
        Self { result: result.into() }
    }
}

/// Decode any response body from JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the text does not match `T`.
pub fn decode_response<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
