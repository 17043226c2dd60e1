//! # conntap
//!
//! Connection middleware that watches the bytes go by.
//! Nothing more. Nothing less.
//!
//! ## The contract
//!
//! A connection pipeline is a chain of stages. conntap adds one stage,
//! [`ObservationMiddleware`](middleware::ObservationMiddleware), that reports
//! every read and write on a connection's transport to an
//! [`ObservationSink`](middleware::ObservationSink) while the rest of the
//! pipeline carries on unaware:
//!
//! - **Same bytes**: nothing is buffered or rewritten.
//! - **Same errors**: a transport failure comes out exactly as it went in.
//! - **Same transport afterwards**: the original transport is back on the
//!   connection when the stage returns, whether `next` succeeded, failed,
//!   panicked, or was cancelled.
//!
//! Multiplexed connections (one physical connection, many sub-connections)
//! are handled by a proxy that observes each sub-connection as it is
//! accepted or opened.
//!
//! What conntap leaves to others: accepting connections, handshakes, TLS,
//! and where the observations end up.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use conntap::middleware::{ObservationMiddleware, TracingSink};
//! use conntap::{
//!     ConnectionContext, ConnectionHandler, DuplexTransport, Error, TransportInput,
//!     TransportOutput, connection_fn,
//! };
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let stage = Arc::new(ObservationMiddleware::new(Arc::new(TracingSink)).with_next(
//!         connection_fn(|conn| {
//!             Box::pin(async move {
//!                 let mut buf = [0u8; 1024];
//!                 let n = conn.transport().input().read(&mut buf).await?;
//!                 conn.transport().output().write(&buf[..n]).await?;
//!                 Ok::<_, Error>(())
//!             })
//!         }),
//!     ));
//!
//!     let listener = TcpListener::bind("127.0.0.1:4000").await?;
//!     loop {
//!         let (socket, peer) = listener.accept().await?;
//!         let stage = Arc::clone(&stage);
//!         tokio::spawn(async move {
//!             let transport = DuplexTransport::from_io(socket);
//!             let mut conn = ConnectionContext::new(peer.to_string(), transport);
//!             let _ = stage.on_connection(&mut conn).await;
//!         });
//!     }
//! }
//! ```

mod cancel;
mod connection;
mod error;
mod features;
mod handler;
mod io;
mod transport;

pub mod http;
pub mod middleware;

pub use cancel::CancellationToken;
pub use connection::{Connection, ConnectionContext, ConnectionKind, MultiplexedConnection};
pub use error::{ConnectionAborted, Error};
pub use features::{Features, Items};
pub use handler::{
    BoxFuture, BoxedConnectionHandler, BoxedMultiplexedHandler, ConnectionHandler,
    FnConnectionHandler, FnMultiplexedHandler, MultiplexedHandler, connection_fn, multiplexed_fn,
};
pub use io::TransportIo;
pub use transport::{DuplexTransport, TransportInput, TransportOutput};
