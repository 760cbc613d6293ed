//! Persistent message transport over WebSocket.
//!
//! DESIGN
//! ======
//! `connect` opens one link and splits it. A reader task owns the read half:
//! it answers server pings (tungstenite does this while the stream is polled),
//! forwards text to an inbound channel, and reports unsolicited close/error to
//! the [`ConnectionObserver`]. `receive` pops the next inbound message, so a
//! reply that lands before `receive` is called is not lost.
//!
//! LIFECYCLE
//! =========
//! Disconnected → Connecting → Connected → Disconnected. `connect` on a live
//! link is a no-op. A link the peer closed, or that hit a fatal read error,
//! counts as disconnected and is replaced by the next `connect`. `close` is
//! idempotent and waits for the peer to acknowledge before returning. Closing
//! ends the reader, which wakes a pending `receive` with `Closed`.
//!
//! CORRELATION
//! ===========
//! Messages carry no request id. Callers issue one send and then one receive
//! and must not interleave two such pairs on one transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::TransportError;
use crate::logger::{Logger, REDACTED, default_logger};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Inbound = Result<String, TransportError>;

/// Observable phase of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Callbacks for events the caller did not ask for.
///
/// Invoked from the reader task; implementations should return quickly.
pub trait ConnectionObserver: Send + Sync {
    /// The peer closed the connection.
    fn on_close(&self, _code: Option<u16>, _reason: &str) {}

    /// Reading from the connection failed; the link is now dead.
    fn on_error(&self, _message: &str) {}

    /// A pong arrived in answer to a keep-alive ping.
    fn on_pong(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConnectionObserver for NoopObserver {}

// =============================================================================
// LINK
// =============================================================================

/// One open connection and the tasks serving it.
struct Link {
    sink: Arc<Mutex<WsSink>>,
    inbound: Arc<Mutex<mpsc::UnboundedReceiver<Inbound>>>,
    open: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
}

impl Link {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Send a close frame and wait for the reader to see the stream end.
    async fn shutdown(mut self, deadline: Duration, logger: &dyn Logger) {
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
        self.closing.store(true, Ordering::SeqCst);

        if self.is_open() {
            let closed = self.sink.lock().await.close().await;
            if let Err(e) = closed {
                logger.error(&format!("Error closing WebSocket: {e}"));
            }
        }

        match tokio::time::timeout(deadline, &mut self.reader).await {
            Ok(Ok(())) => logger.info("WebSocket connection closed"),
            Ok(Err(e)) => logger.error(&format!("WebSocket reader ended abnormally: {e}")),
            Err(_) => {
                logger.error("WebSocket close was not acknowledged in time");
                self.reader.abort();
            }
        }
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Holds the `connecting` flag up until dropped, so a cancelled handshake
/// does not leave the transport reporting `Connecting`.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl<'a> ConnectingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

pub struct WsTransport {
    url: String,
    headers: HeaderMap,
    handshake_timeout: Duration,
    ping_interval: Option<Duration>,
    logger: Arc<dyn Logger>,
    observer: Arc<dyn ConnectionObserver>,
    connecting: AtomicBool,
    link: Mutex<Option<Link>>,
}

impl WsTransport {
    /// Create a disconnected transport for `url`.
    ///
    /// `headers` are sent with every upgrade request. `handshake_timeout`
    /// bounds `connect`; nothing else has a deadline.
    #[must_use]
    pub fn new(url: impl Into<String>, headers: HeaderMap, handshake_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers,
            handshake_timeout,
            ping_interval: None,
            logger: default_logger(),
            observer: Arc::new(NoopObserver),
            connecting: AtomicBool::new(false),
            link: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Send a ping every `interval` while connected.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn state(&self) -> ConnectionState {
        if self.connecting.load(Ordering::SeqCst) {
            return ConnectionState::Connecting;
        }
        match self.link.lock().await.as_ref() {
            Some(link) if link.is_open() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Open the connection unless one is already live.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if the handshake exceeds its
    /// deadline and [`TransportError::Handshake`] if it is rejected.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut slot = self.link.lock().await;
        if slot.as_ref().is_some_and(Link::is_open) {
            self.logger.info(&format!("Already connected to {}", self.url));
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            stale.shutdown(self.handshake_timeout, self.logger.as_ref()).await;
        }

        let opened = {
            let _connecting = ConnectingGuard::raise(&self.connecting);
            self.open_link().await
        };

        *slot = Some(opened?);
        Ok(())
    }

    async fn open_link(&self) -> Result<Link, TransportError> {
        self.logger.info(&format!("Connecting to {}", self.url));

        let mut request = self.url.as_str().into_client_request().map_err(|e| TransportError::InvalidRequest {
            url: self.url.clone(),
            message: e.to_string(),
        })?;
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let (stream, _) = match tokio::time::timeout(self.handshake_timeout, connect_async(request)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                self.logger.error(&format!("WebSocket connection error: {e}"));
                return Err(TransportError::Handshake(Box::new(e)));
            }
            Err(_) => {
                self.logger.error(&format!("WebSocket handshake to {} timed out", self.url));
                return Err(TransportError::Timeout(self.handshake_timeout));
            }
        };
        self.logger.info("WebSocket connection established");

        let (sink, stream) = stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            stream,
            tx,
            open.clone(),
            closing.clone(),
            self.observer.clone(),
            self.logger.clone(),
        ));
        let keepalive = self
            .ping_interval
            .map(|interval| tokio::spawn(keepalive_loop(sink.clone(), open.clone(), interval, self.logger.clone())));

        Ok(Link {
            sink,
            inbound: Arc::new(Mutex::new(rx)),
            open,
            closing,
            reader,
            keepalive,
        })
    }

    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] without a live link, or
    /// [`TransportError::WebSocket`] if the write fails.
    pub async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        let sink = {
            let slot = self.link.lock().await;
            match slot.as_ref() {
                Some(link) if link.is_open() => link.sink.clone(),
                _ => {
                    self.logger.error("Cannot send message: WebSocket connection closed");
                    return Err(TransportError::NotConnected);
                }
            }
        };

        let sent = sink.lock().await.send(Message::text(text.to_owned())).await;
        match sent {
            Ok(()) => {
                self.logger.debug(&format!("Message sent: {REDACTED}"));
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("Cannot send message: {e}"));
                Err(TransportError::WebSocket(Box::new(e)))
            }
        }
    }

    /// Send `message` as text. Strings go out as they are; anything else is
    /// serialized to JSON first.
    ///
    /// # Errors
    ///
    /// See [`WsTransport::send_text`]; serialization failures surface as
    /// [`TransportError::InvalidRequest`].
    pub async fn send<T: Serialize + ?Sized + Sync>(&self, message: &T) -> Result<(), TransportError> {
        let value = serde_json::to_value(message).map_err(|e| TransportError::InvalidRequest {
            url: self.url.clone(),
            message: e.to_string(),
        })?;
        let text = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.send_text(&text).await
    }

    /// Wait for the next inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if `connect` was never called
    /// (or `close` was), [`TransportError::Closed`] once the peer has closed
    /// and buffered messages are drained, or the read error that killed the
    /// link.
    pub async fn receive(&self) -> Result<String, TransportError> {
        let inbound = {
            let slot = self.link.lock().await;
            match slot.as_ref() {
                Some(link) => link.inbound.clone(),
                None => {
                    self.logger.error("Cannot receive message: WebSocket connection closed");
                    return Err(TransportError::NotConnected);
                }
            }
        };

        let next = inbound.lock().await.recv().await;
        match next {
            Some(Ok(text)) => {
                self.logger.debug(&format!("Message received: {REDACTED}"));
                Ok(text)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Closed),
        }
    }

    /// Close the link if there is one. Safe to call repeatedly.
    pub async fn close(&self) {
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            link.shutdown(self.handshake_timeout, self.logger.as_ref()).await;
        }
    }
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<Inbound>,
    open: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    observer: Arc<dyn ConnectionObserver>,
    logger: Arc<dyn Logger>,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if tx.send(Ok(text.as_str().to_owned())).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => {
                if tx.send(Ok(String::from_utf8_lossy(&bytes).into_owned())).is_err() {
                    break;
                }
            }
            Ok(Message::Pong(_)) => observer.on_pong(),
            Ok(Message::Close(frame)) => {
                open.store(false, Ordering::SeqCst);
                if !closing.load(Ordering::SeqCst) {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                        .unwrap_or_default();
                    logger.info(&format!("WebSocket closed by peer (code {code:?})"));
                    observer.on_close(code, &reason);
                }
            }
            Ok(Message::Ping(_) | Message::Frame(_)) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                // Once either side has started closing, a failed read just ends the link.
                let was_open = open.swap(false, Ordering::SeqCst);
                if closing.load(Ordering::SeqCst) || !was_open {
                    logger.debug(&format!("WebSocket read ended after close: {e}"));
                    break;
                }
                logger.error(&format!("WebSocket read failed: {e}"));
                observer.on_error(&e.to_string());
                if tx.send(Err(TransportError::WebSocket(Box::new(e)))).is_err() {
                    logger.debug("Read error dropped; no receiver is waiting");
                }
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
}

async fn keepalive_loop(sink: Arc<Mutex<WsSink>>, open: Arc<AtomicBool>, interval: Duration, logger: Arc<dyn Logger>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !open.load(Ordering::SeqCst) {
            break;
        }
        let pinged = sink.lock().await.send(Message::Ping(Vec::new().into())).await;
        if let Err(e) = pinged {
            logger.error(&format!("Keep-alive ping failed: {e}"));
            break;
        }
        logger.debug("Keep-alive ping sent");
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
