//! Middleware layer.
//!
//! Middleware sits between two connection stages and adds cross-cutting
//! behaviour without the stages on either side noticing. The built-in one is
//! traffic observation:
//!
//! - [`ObservableStream`]: one transport side that reports each read or write.
//! - [`ObservableDuplexTransport`]: both sides of a transport, observed.
//! - [`ObservedMultiplexedConnection`]: a proxy that observes every
//!   sub-connection a multiplexed connection accepts or opens.
//! - [`ObservationMiddleware`]: the stage tying it together.
//!
//! Events go to an [`ObservationSink`]. [`TracingSink`] logs them,
//! [`ByteCounters`] totals them, [`NoopSink`] drops them.

mod duplex;
mod multiplexed;
mod observation;
mod stage;
mod stream;

pub use duplex::ObservableDuplexTransport;
pub use multiplexed::ObservedMultiplexedConnection;
pub use observation::{
    ByteCounters, DEFAULT_SAMPLE_LIMIT, Direction, NoopSink, ObservationEvent, ObservationOptions,
    ObservationSink, TracingSink,
};
pub use stage::ObservationMiddleware;
pub use stream::ObservableStream;
