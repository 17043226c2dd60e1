//! Stage contracts and type erasure.
//!
//! # How stages are chained
//!
//! A pipeline is a chain of stages where each one holds the next behind an
//! `Arc<dyn …>`. Stages borrow the connection rather than own it, so the
//! future a stage returns carries the borrow's lifetime:
//!
//! ```text
//! driver ──&mut ConnectionContext──▶ ObservationMiddleware
//!                                        │ swaps transport
//!                                        ▼
//!                                  next.on_connection(conn)   ← one vtable call
//!                                        │
//!                                        ▼
//!                               BoxFuture<'a, Result<(), Error>>
//! ```
//!
//! Plain closures become stages through [`connection_fn`] and
//! [`multiplexed_fn`]. Passing the closure straight into those functions lets
//! the compiler infer the higher-ranked signature the trait needs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::connection::{ConnectionContext, MultiplexedConnection};
use crate::error::Error;

/// A heap-allocated, type-erased future that may borrow for `'a`.
///
/// `Send` lets the runtime move a connection task across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A pipeline stage for single connections.
pub trait ConnectionHandler: Send + Sync {
    fn on_connection<'a>(&'a self, conn: &'a mut ConnectionContext)
    -> BoxFuture<'a, Result<(), Error>>;
}

/// A pipeline stage for multiplexed connections.
pub trait MultiplexedHandler: Send + Sync {
    fn on_multiplexed<'a>(
        &'a self,
        conn: &'a mut dyn MultiplexedConnection,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// A shared single-connection stage.
pub type BoxedConnectionHandler = Arc<dyn ConnectionHandler>;

/// A shared multiplexed stage.
pub type BoxedMultiplexedHandler = Arc<dyn MultiplexedHandler>;

impl<H: ConnectionHandler + ?Sized> ConnectionHandler for Arc<H> {
    fn on_connection<'a>(
        &'a self,
        conn: &'a mut ConnectionContext,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (**self).on_connection(conn)
    }
}

impl<H: MultiplexedHandler + ?Sized> MultiplexedHandler for Arc<H> {
    fn on_multiplexed<'a>(
        &'a self,
        conn: &'a mut dyn MultiplexedConnection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (**self).on_multiplexed(conn)
    }
}

// ── Closure adapters ──────────────────────────────────────────────────────────

/// Turns a closure into a [`ConnectionHandler`].
///
/// ```rust
/// use conntap::{connection_fn, ConnectionHandler, Error, TransportOutput};
///
/// let stage = connection_fn(|conn| {
///     Box::pin(async move {
///         conn.transport().output().write(b"hello").await?;
///         Ok::<_, Error>(())
///     })
/// });
/// # fn assert_stage(_: &impl ConnectionHandler) {}
/// # assert_stage(&stage);
/// ```
pub fn connection_fn<F>(f: F) -> FnConnectionHandler<F>
where
    F: for<'a> Fn(&'a mut ConnectionContext) -> BoxFuture<'a, Result<(), Error>> + Send + Sync,
{
    FnConnectionHandler(f)
}

/// Turns a closure into a [`MultiplexedHandler`].
pub fn multiplexed_fn<F>(f: F) -> FnMultiplexedHandler<F>
where
    F: for<'a> Fn(&'a mut dyn MultiplexedConnection) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync,
{
    FnMultiplexedHandler(f)
}

/// Newtype holding a closure stage; built by [`connection_fn`].
pub struct FnConnectionHandler<F>(F);

impl<F> ConnectionHandler for FnConnectionHandler<F>
where
    F: for<'a> Fn(&'a mut ConnectionContext) -> BoxFuture<'a, Result<(), Error>> + Send + Sync,
{
    fn on_connection<'a>(
        &'a self,
        conn: &'a mut ConnectionContext,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (self.0)(conn)
    }
}

/// Newtype holding a closure stage; built by [`multiplexed_fn`].
pub struct FnMultiplexedHandler<F>(F);

impl<F> MultiplexedHandler for FnMultiplexedHandler<F>
where
    F: for<'a> Fn(&'a mut dyn MultiplexedConnection) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync,
{
    fn on_multiplexed<'a>(
        &'a self,
        conn: &'a mut dyn MultiplexedConnection,
    ) -> BoxFuture<'a, Result<(), Error>> {
        (self.0)(conn)
    }
}
