//! The observation stage.
//!
//! # Single connections
//!
//! ```text
//! Idle ─▶ TransportSwapped ─▶ Invoking ─▶ Restoring ─▶ Done
//! ```
//!
//! The swap lives in a [`SwapScope`] guard. Restoration happens in its `Drop`,
//! so it runs whether `next` returns, fails, panics, or the whole stage future
//! is dropped mid-flight. `Option::take` on the saved transport makes it
//! happen once.
//!
//! # Multiplexed connections
//!
//! ```text
//! Idle ─▶ ProxyConstructed ─▶ Invoking ─▶ Done
//! ```
//!
//! Nothing is mutated, so there is nothing to restore: the proxy is simply
//! dropped when `next` finishes.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::duplex::ObservableDuplexTransport;
use super::multiplexed::ObservedMultiplexedConnection;
use super::observation::{ObservationOptions, ObservationSink};
use crate::connection::{Connection, ConnectionContext, ConnectionKind, MultiplexedConnection};
use crate::error::Error;
use crate::handler::{
    BoxFuture, BoxedConnectionHandler, BoxedMultiplexedHandler, ConnectionHandler,
    MultiplexedHandler,
};
use crate::transport::DuplexTransport;

/// Middleware that reports every byte a connection reads or writes.
///
/// Downstream stages see an ordinary connection. Build one per listener and
/// share it; per-connection state lives only inside each call.
///
/// ```rust
/// use std::sync::Arc;
/// use conntap::{connection_fn, Error, TransportOutput};
/// use conntap::middleware::{ObservationMiddleware, ObservationOptions, TracingSink};
///
/// let stage = ObservationMiddleware::new(Arc::new(TracingSink))
///     .with_options(ObservationOptions::default().with_sample_limit(64))
///     .with_next(connection_fn(|conn| {
///         Box::pin(async move {
///             conn.transport().output().write(b"hi").await?;
///             Ok::<_, Error>(())
///         })
///     }));
/// # let _ = stage;
/// ```
pub struct ObservationMiddleware {
    next: Option<BoxedConnectionHandler>,
    multiplexed_next: Option<BoxedMultiplexedHandler>,
    sink: Arc<dyn ObservationSink>,
    options: ObservationOptions,
}

impl ObservationMiddleware {
    pub fn new(sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            next: None,
            multiplexed_next: None,
            sink,
            options: ObservationOptions::default(),
        }
    }

    /// Sets the stage single connections are handed to.
    pub fn with_next(mut self, next: impl ConnectionHandler + 'static) -> Self {
        self.next = Some(Arc::new(next));
        self
    }

    /// Sets the stage multiplexed connections are handed to.
    pub fn with_multiplexed_next(mut self, next: impl MultiplexedHandler + 'static) -> Self {
        self.multiplexed_next = Some(Arc::new(next));
        self
    }

    pub fn with_options(mut self, options: ObservationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ObservationOptions {
        self.options
    }

    /// Runs the stage for either connection shape.
    pub async fn dispatch(&self, conn: Connection<'_>) -> Result<(), Error> {
        match conn {
            Connection::Single(conn) => self.observe_connection(conn).await,
            Connection::Multiplexed(conn) => self.observe_multiplexed(conn).await,
        }
    }

    async fn observe_connection(&self, conn: &mut ConnectionContext) -> Result<(), Error> {
        let Some(next) = &self.next else {
            warn!(
                connection_id = %conn.connection_id(),
                "single connection reached a multiplexed-only stage"
            );
            return Err(Error::MissingHandler(ConnectionKind::Single));
        };

        let mut scope = SwapScope::enter(conn, Arc::clone(&self.sink), self.options);
        debug!(connection_id = %scope.connection_id(), "transport swapped for observation");

        let result = next.on_connection(&mut *scope).await;
        drop(scope);
        result
    }

    async fn observe_multiplexed(&self, conn: &mut dyn MultiplexedConnection) -> Result<(), Error> {
        let Some(next) = &self.multiplexed_next else {
            warn!(
                connection_id = %conn.connection_id(),
                "multiplexed connection reached a single-only stage"
            );
            return Err(Error::MissingHandler(ConnectionKind::Multiplexed));
        };

        let mut proxy =
            ObservedMultiplexedConnection::new(conn, Arc::clone(&self.sink), self.options);
        debug!(connection_id = %proxy.connection_id(), "observing multiplexed connection");
        next.on_multiplexed(&mut proxy).await
    }
}

impl ConnectionHandler for ObservationMiddleware {
    fn on_connection<'a>(
        &'a self,
        conn: &'a mut ConnectionContext,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.observe_connection(conn))
    }
}

impl MultiplexedHandler for ObservationMiddleware {
    fn on_multiplexed<'a>(
        &'a self,
        conn: &'a mut dyn MultiplexedConnection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.observe_multiplexed(conn))
    }
}

// ── Swap scope ────────────────────────────────────────────────────────────────

/// Holds a connection whose transport is temporarily observed.
///
/// Derefs to the connection so `next` can be handed the scope itself.
struct SwapScope<'c> {
    conn: &'c mut ConnectionContext,
    original: Option<DuplexTransport>,
    observed: ObservableDuplexTransport,
}

impl<'c> SwapScope<'c> {
    fn enter(
        conn: &'c mut ConnectionContext,
        sink: Arc<dyn ObservationSink>,
        options: ObservationOptions,
    ) -> Self {
        let original = conn.transport().clone();
        let observed = ObservableDuplexTransport::new(original.clone(), sink, options);
        conn.set_transport(observed.transport());
        Self { conn, original: Some(original), observed }
    }

    fn restore(&mut self) {
        if let Some(original) = self.original.take() {
            self.conn.set_transport(original);
            self.observed.dispose();
            trace!(connection_id = %self.conn.connection_id(), "original transport restored");
        }
    }
}

impl Deref for SwapScope<'_> {
    type Target = ConnectionContext;

    fn deref(&self) -> &ConnectionContext {
        self.conn
    }
}

impl DerefMut for SwapScope<'_> {
    fn deref_mut(&mut self) -> &mut ConnectionContext {
        self.conn
    }
}

impl Drop for SwapScope<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
