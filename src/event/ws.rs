//! Stack operations as envelopes on a persistent WebSocket.
//!
//! DESIGN
//! ======
//! Authorization goes over HTTP. The token then becomes an upgrade header on
//! a [`WsTransport`] that is opened eagerly after authorization (unless
//! disabled) or lazily by the first operation.
//!
//! Every operation sends one envelope and reads one reply. A turn lock is held
//! for the whole send/receive pair, so two overlapping calls on one instance
//! run one after the other instead of reading each other's replies. The
//! transport slot has its own short-lived lock: `close` can tear the
//! connection down while a reply is still pending, which fails that
//! operation with `Closed`.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use frames::{DocumentsRequest, Envelope, EventKind, GenericResponse, QueryRequest, decode_response, encode_envelope};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::files::encode_files;
use super::{
    DEFAULT_CLOSE_MESSAGE, DEFAULT_INIT_MESSAGE, NO_ACTIVE_SESSION, OP_AUTHORIZE, OP_BOOTSTRAP, OP_DESTROY,
    OP_QUERY, OP_STORE, Session, StackEvent, request_session,
};
use crate::config::ClientConfig;
use crate::error::{StackError, TransportError};
use crate::logger::{Logger, default_logger};
use crate::transport::header_map;
use crate::transport::rest::RestTransport;
use crate::transport::ws::{ConnectionObserver, ConnectionState, NoopObserver, WsTransport};

pub struct WsEvent {
    config: ClientConfig,
    rest: RestTransport,
    session: RwLock<Option<Session>>,
    transport: Mutex<Option<Arc<WsTransport>>>,
    /// Held across one send/receive pair.
    turn: Mutex<()>,
    eager_connect: bool,
    observer: Arc<dyn ConnectionObserver>,
    logger: Arc<dyn Logger>,
}

impl WsEvent {
    /// Build an event client for `config.ws_url()`, authorizing against
    /// `config.http_base_url()`.
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
        Ok(Self {
            config: config.clone(),
            rest,
            session: RwLock::new(None),
            transport: Mutex::new(None),
            turn: Mutex::new(()),
            eager_connect: true,
            observer: Arc::new(NoopObserver),
            logger,
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.rest = self.rest.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// Observer handed to every connection this event opens.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Whether `authorize_stack` opens the connection right away. Default true.
    #[must_use]
    pub fn with_eager_connect(mut self, eager: bool) -> Self {
        self.eager_connect = eager;
        self
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        let transport = self.transport.lock().await.clone();
        match transport {
            Some(transport) => transport.state().await,
            None => ConnectionState::Disconnected,
        }
    }

    /// Open the connection now instead of on the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotAuthorized`] without a session, or the
    /// handshake failure.
    pub async fn connect(&self) -> Result<(), StackError> {
        let session = self.require_session()?;
        self.connected_transport(&session, "connect").await?;
        Ok(())
    }

    /// Close the connection but keep the session. The next operation
    /// reconnects. An operation waiting for its reply fails with
    /// [`TransportError::Closed`].
    pub async fn close(&self) {
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    fn require_session(&self) -> Result<Session, StackError> {
        self.session().ok_or(StackError::NotAuthorized)
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn build_transport(&self, session: &Session, operation: &'static str) -> Result<Arc<WsTransport>, StackError> {
        let bearer = session.bearer();
        let headers = header_map(
            self.config
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .chain([(AUTHORIZATION.as_str(), bearer.as_str())]),
        )
        .map_err(|e| StackError::transport(operation, self.config.ws_url(), e))?;

        let transport = WsTransport::new(self.config.ws_url(), headers, self.config.ping_timeout)
            .with_ping_interval(self.config.ping_interval)
            .with_logger(self.logger.clone())
            .with_observer(self.observer.clone());
        Ok(Arc::new(transport))
    }

    /// The current transport, created if missing and opened if not live.
    ///
    /// The slot lock is released before connecting so `close` and
    /// `connection_state` never wait on network I/O.
    async fn connected_transport(
        &self,
        session: &Session,
        operation: &'static str,
    ) -> Result<Arc<WsTransport>, StackError> {
        let transport = {
            let mut slot = self.transport.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => slot.insert(self.build_transport(session, operation)?).clone(),
            }
        };
        transport
            .connect()
            .await
            .map_err(|e| StackError::transport(operation, transport.url(), e))?;
        Ok(transport)
    }

    /// Send one envelope and wait for its reply.
    async fn send_message<B: Serialize + Sync>(
        &self,
        operation: &'static str,
        kind: EventKind,
        body: &B,
    ) -> Result<GenericResponse, StackError> {
        let session = self.require_session()?;
        let envelope = Envelope::new(kind, body).map_err(|source| StackError::Codec { operation, source })?;
        let text = encode_envelope(&envelope).map_err(|source| StackError::Codec { operation, source })?;

        let _turn = self.turn.lock().await;
        let transport = self.connected_transport(&session, operation).await?;
        let target = format!("{} ({kind})", transport.url());

        self.logger.info(&format!("Sending {kind} message"));
        transport
            .send_text(&text)
            .await
            .map_err(|e| StackError::transport(operation, target.clone(), e))?;
        let reply = transport
            .receive()
            .await
            .map_err(|e| StackError::transport(operation, target, e))?;
        self.logger.info(&format!("Received {kind} reply"));

        let trimmed = reply.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(StackError::EmptyReply { event: kind });
        }
        decode_response(trimmed).map_err(|source| StackError::Codec { operation, source })
    }
}

#[async_trait]
impl StackEvent for WsEvent {
    async fn authorize_stack(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Session, StackError> {
        let session = request_session(&self.rest, client_id, client_secret, scope, self.logger.as_ref()).await?;
        let transport = self
            .build_transport(&session, OP_AUTHORIZE)
            .inspect_err(|e| self.logger.error(&format!("Authorization failed: {e}")))?;
        self.set_session(Some(session.clone()));

        let previous = self.transport.lock().await.replace(transport.clone());
        if let Some(previous) = previous {
            previous.close().await;
        }

        if self.eager_connect {
            transport
                .connect()
                .await
                .map_err(|e| StackError::transport(OP_AUTHORIZE, transport.url(), e))
                .inspect_err(|e| self.logger.error(&format!("Authorization failed: {e}")))?;
        }
        Ok(session)
    }

    async fn destroy_stack(&self, message: Option<&str>) -> Result<GenericResponse, StackError> {
        if self.session().is_none() {
            self.logger.warn("No active session to destroy");
            return Ok(GenericResponse::new(NO_ACTIVE_SESSION));
        }

        let body = QueryRequest::new(Some(message.unwrap_or(DEFAULT_CLOSE_MESSAGE).to_string()));
        let response = self
            .send_message(OP_DESTROY, EventKind::Close, &body)
            .await
            .inspect_err(|e| self.logger.error(&format!("Failed to destroy stack session: {e}")))?;

        self.set_session(None);
        self.close().await;
        Ok(response)
    }

    async fn bootstrap_stack(&self, message: Option<&str>) -> Result<GenericResponse, StackError> {
        let body = QueryRequest::new(Some(message.unwrap_or(DEFAULT_INIT_MESSAGE).to_string()));
        self.send_message(OP_BOOTSTRAP, EventKind::Init, &body)
            .await
            .inspect_err(|e| self.logger.error(&format!("Failed to bootstrap stack: {e}")))
    }

    async fn generate_answer(&self, message: Option<&str>) -> Result<GenericResponse, StackError> {
        let body = QueryRequest::new(message.map(str::to_string));
        self.send_message(OP_QUERY, EventKind::Query, &body)
            .await
            .inspect_err(|e| self.logger.error(&format!("Failed to generate answer: {e}")))
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
            self.send_message(OP_STORE, EventKind::Store, &body).await
        }
        .await;
        result.inspect_err(|e| self.logger.error(&format!("Failed to store documents: {e}")))
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
