//! Injectable logging capability.
//!
//! Events and transports log through a [`Logger`] handed to them at
//! construction. The default, [`TracingLogger`], forwards to `tracing`, so an
//! application that installs a subscriber sees SDK output alongside its own.
//!
//! Message bodies may hold documents and credentials. Debug lines never carry
//! them; use [`REDACTED`] in their place.

use std::sync::Arc;

/// Placeholder written instead of a message body.
pub const REDACTED: &str = "****";

/// Leveled log sink used by the SDK.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);

    fn warn(&self, message: &str) {
        self.info(message);
    }
}

/// Default logger: forwards to the `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "stack_client", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "stack_client", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "stack_client", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "stack_client", "{message}");
    }
}

/// Shared handle to the default logger.
#[must_use]
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}
