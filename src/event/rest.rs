//! Stack operations as one HTTP request each.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use frames::{DocumentsRequest, EventKind, GenericResponse, QueryRequest};
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Serialize;
use serde_json::{Map, Value};

use super::files::encode_files;
use super::{
    DEFAULT_CLOSE_MESSAGE, NO_ACTIVE_SESSION, OP_BOOTSTRAP, OP_DESTROY, OP_QUERY, OP_STORE, Session, StackEvent,
    decode_value, request_session,
};
use crate::config::ClientConfig;
use crate::error::{StackError, TransportError};
use crate::logger::{Logger, default_logger};
use crate::transport::rest::RestTransport;

pub struct RestEvent {
    rest: RestTransport,
    session: RwLock<Option<Session>>,
    logger: Arc<dyn Logger>,
}

impl RestEvent {
    /// Build an event client against `config.http_base_url()`.
    ///
    /// Custom headers from `config` become default headers on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a custom header
    /// is not valid HTTP.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let logger = default_logger();
        let rest = RestTransport::new(config.http_base_url(), config.request_timeout)?.with_logger(logger.clone());
        for (name, value) in &config.headers {
            rest.set_default_header(name, value)?;
        }
        Ok(Self { rest, session: RwLock::new(None), logger })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.rest = self.rest.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// The current session, if authorized.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The underlying transport, e.g. to adjust its timeout.
    #[must_use]
    pub fn transport(&self) -> &RestTransport {
        &self.rest
    }

    fn require_session(&self) -> Result<Session, StackError> {
        self.session().ok_or(StackError::NotAuthorized)
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// POST `body` to the route `kind` maps to and decode `{result}`.
    async fn post_event<B: Serialize + Sync>(
        &self,
        operation: &'static str,
        kind: EventKind,
        body: &B,
    ) -> Result<GenericResponse, StackError> {
        let route = kind.rest_route();
        let params = route.action.map(|action| [("action", action)]);
        let query = params.as_ref().map(<[_; 1]>::as_slice);
        let target = self.rest.url_for(route.path, query);

        self.logger.info(&format!("Sending {kind} request to {target}"));
        let value = self
            .rest
            .post(route.path, body, &HeaderMap::new(), query)
            .await
            .map_err(|e| StackError::transport(operation, target, e))?;
        decode_value(operation, value)
    }
}

#[async_trait]
impl StackEvent for RestEvent {
    async fn authorize_stack(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Session, StackError> {
        let session = request_session(&self.rest, client_id, client_secret, scope, self.logger.as_ref()).await?;
        self.rest
            .set_default_header(AUTHORIZATION.as_str(), &session.bearer())
            .map_err(|e| StackError::transport(super::OP_AUTHORIZE, self.rest.base_url(), e))
            .inspect_err(|e| self.logger.error(&format!("Authorization failed: {e}")))?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn destroy_stack(&self, message: Option<&str>) -> Result<GenericResponse, StackError> {
        if self.session().is_none() {
            self.logger.warn("No active session to destroy");
            return Ok(GenericResponse::new(NO_ACTIVE_SESSION));
        }

        let body = QueryRequest::new(Some(message.unwrap_or(DEFAULT_CLOSE_MESSAGE).to_string()));
        let response = self
            .post_event(OP_DESTROY, EventKind::Close, &body)
            .await
            .inspect_err(|e| self.logger.error(&format!("Failed to destroy stack session: {e}")))?;

        self.set_session(None);
        self.rest.remove_default_header(AUTHORIZATION.as_str());
        Ok(response)
    }

    async fn bootstrap_stack(&self, message: Option<&str>) -> Result<GenericResponse, StackError> {
        let result = async {
            self.require_session()?;
            let body = QueryRequest::new(message.map(str::to_string));
            self.post_event(OP_BOOTSTRAP, EventKind::Init, &body).await
        }
        .await;
        result.inspect_err(|e| self.logger.error(&format!("Failed to bootstrap stack: {e}")))
    }

    async fn generate_answer(&self, message: Option<&str>) -> Result<GenericResponse, StackError> {
        let result = async {
            self.require_session()?;
            let body = QueryRequest::new(message.map(str::to_string));
            self.post_event(OP_QUERY, EventKind::Query, &body).await
        }
        .await;
        result.inspect_err(|e| self.logger.error(&format!("Failed to generate answer: {e}")))
    }

    async fn store_data(
        &self,
        paths: &[PathBuf],
        metadata: Option<Map<String, Value>>,
    ) -> Result<GenericResponse, StackError> {
        let result = async {
            self.require_session()?;
            let files = encode_files(paths, self.logger.as_ref()).await?;
            let body = DocumentsRequest { files, metadata: metadata.unwrap_or_default() };
            self.post_event(OP_STORE, EventKind::Store, &body).await
        }
        .await;
        result.inspect_err(|e| self.logger.error(&format!("Failed to store documents: {e}")))
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
