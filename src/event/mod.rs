//! Stack operations over either transport.
//!
//! DESIGN
//! ======
//! [`StackEvent`] is the one contract callers program against. Two
//! implementations satisfy it:
//!
//! - [`RestEvent`]: one HTTP request per operation; the session is a bearer
//!   header installed on the transport.
//! - [`WsEvent`]: authorization over HTTP, then every operation is an
//!   [`frames::Envelope`] on a lazily opened WebSocket with exactly one reply.
//!
//! The trait holds no state. Each implementation owns its session and the
//! credential header derived from it.
//!
//! ERROR HANDLING
//! ==============
//! Every failure is logged and returned. Operations that need a session fail
//! with [`StackError::NotAuthorized`] before touching the network. The only
//! graceful path is `destroy_stack` without a session, which returns the
//! [`NO_ACTIVE_SESSION`] result.

pub mod files;
pub mod rest;
pub mod ws;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use frames::{CodecError, GenericResponse, SessionRequest, SessionResponse};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

pub use rest::RestEvent;
pub use ws::WsEvent;

use crate::error::StackError;
use crate::logger::Logger;
use crate::transport::rest::RestTransport;

/// Result text of `destroy_stack` when there is nothing to destroy.
pub const NO_ACTIVE_SESSION: &str = "No active session";
/// Default CLOSE message.
pub const DEFAULT_CLOSE_MESSAGE: &str = "Goodbye!";
/// Default INIT message on the WebSocket path.
pub const DEFAULT_INIT_MESSAGE: &str = "Greetings!";

pub(crate) const AUTH_PATH: &str = "/auth";

pub(crate) const OP_AUTHORIZE: &str = "authorize_stack";
pub(crate) const OP_BOOTSTRAP: &str = "bootstrap_stack";
pub(crate) const OP_QUERY: &str = "generate_answer";
pub(crate) const OP_STORE: &str = "store_data";
pub(crate) const OP_DESTROY: &str = "destroy_stack";

/// The five stack operations, identical in contract for both transports.
#[async_trait]
pub trait StackEvent: Send + Sync {
    /// Obtain a session. Always performed over HTTP.
    async fn authorize_stack(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Session, StackError>;

    /// End the session. Without one, returns [`NO_ACTIVE_SESSION`].
    async fn destroy_stack(&self, message: Option<&str>) -> Result<GenericResponse, StackError>;

    async fn bootstrap_stack(&self, message: Option<&str>) -> Result<GenericResponse, StackError>;

    async fn generate_answer(&self, message: Option<&str>) -> Result<GenericResponse, StackError>;

    /// Upload readable files among `paths`; unreadable ones are skipped.
    async fn store_data(
        &self,
        paths: &[PathBuf],
        metadata: Option<Map<String, Value>>,
    ) -> Result<GenericResponse, StackError>;
}

// =============================================================================
// SESSION
// =============================================================================

/// An authorized session. `Debug` hides the token and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

impl Session {
    /// Accept an auth response only if it carries a non-empty token.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Authorization`] when the token is missing.
    pub fn from_response(response: SessionResponse) -> Result<Self, StackError> {
        let Some(token) = response.token() else {
            return Err(StackError::Authorization);
        };
        Ok(Self {
            access_token: token.to_string(),
            client_id: response.client_id,
            client_secret: response.client_secret,
            scope: response.scope,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Value of the `Authorization` header for this session.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &crate::logger::REDACTED)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| crate::logger::REDACTED))
            .field("scope", &self.scope)
            .finish()
    }
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// `POST /auth` and turn the reply into a [`Session`].
pub(crate) async fn request_session(
    rest: &RestTransport,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    scope: Option<&str>,
    logger: &dyn Logger,
) -> Result<Session, StackError> {
    let body = SessionRequest {
        client_id: client_id.map(str::to_string),
        client_secret: client_secret.map(str::to_string),
        scope: scope.map(str::to_string),
    };

    let result = async {
        let value = rest
            .post(AUTH_PATH, &body, &HeaderMap::new(), None)
            .await
            .map_err(|e| StackError::transport(OP_AUTHORIZE, rest.url_for(AUTH_PATH, None), e))?;
        let response = decode_value::<SessionResponse>(OP_AUTHORIZE, value)?;
        Session::from_response(response)
    }
    .await;

    match &result {
        Ok(session) => logger.info(&format!("Authorized stack session (client_id {:?})", session.client_id)),
        Err(e) => logger.error(&format!("Authorization failed: {e}")),
    }
    result
}

/// Decode a parsed JSON body into `T`, tagging failures with the operation.
pub(crate) fn decode_value<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    value: Value,
) -> Result<T, StackError> {
    serde_json::from_value(value).map_err(|e| StackError::Codec { operation, source: CodecError::Decode(e) })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
