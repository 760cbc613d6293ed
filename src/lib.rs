//! Client SDK for a remote stack service.
//!
//! Authenticate, then bootstrap, query, store documents and destroy the
//! session over either HTTP ([`RestEvent`]) or a persistent WebSocket
//! ([`WsEvent`]). Both implement [`StackEvent`], so callers can switch
//! transports without changing call sites.
//!
//! ```no_run
//! use stack_client::{ClientConfig, RestEvent, StackEvent};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let stack = RestEvent::new(&config)?;
//! stack.authorize_stack(Some("id"), Some("secret"), None).await?;
//! let answer = stack.generate_answer(Some("What is in the corpus?")).await?;
//! println!("{}", answer.result);
//! stack.destroy_stack(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod logger;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{HttpError, HttpErrorKind, StackError, TransportError};
pub use event::{NO_ACTIVE_SESSION, RestEvent, Session, StackEvent, WsEvent};
pub use frames::{DocumentsRequest, EventKind, FileObject, GenericResponse, QueryRequest, SessionResponse};
pub use logger::{Logger, TracingLogger};
pub use transport::rest::RestTransport;
pub use transport::ws::{ConnectionObserver, ConnectionState, WsTransport};
