//! Observation for multiplexed connections.
//!
//! A multiplexed connection has no single transport to swap. Instead the
//! proxy wraps each sub-connection's transport at the moment the inner
//! connection produces it, so every sub-connection is observed exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::duplex::ObservableDuplexTransport;
use super::observation::{ObservationOptions, ObservationSink};
use crate::cancel::CancellationToken;
use crate::connection::{ConnectionContext, MultiplexedConnection};
use crate::error::{ConnectionAborted, Error};
use crate::features::{Features, Items};

/// Forwards everything to `inner`, observing each sub-connection it hands out.
///
/// Identity, features and items are the inner connection's own, read and
/// written in place. The proxy keeps no state besides the borrow and the sink.
pub struct ObservedMultiplexedConnection<'a> {
    inner: &'a mut dyn MultiplexedConnection,
    sink: Arc<dyn ObservationSink>,
    options: ObservationOptions,
}

impl<'a> ObservedMultiplexedConnection<'a> {
    pub fn new(
        inner: &'a mut dyn MultiplexedConnection,
        sink: Arc<dyn ObservationSink>,
        options: ObservationOptions,
    ) -> Self {
        Self { inner, sink, options }
    }

    fn observe(&self, mut sub: ConnectionContext) -> ConnectionContext {
        let observed = ObservableDuplexTransport::new(
            sub.transport().clone(),
            Arc::clone(&self.sink),
            self.options,
        );
        sub.set_transport(observed.transport());
        trace!(
            connection_id = %self.inner.connection_id(),
            stream_id = %sub.connection_id(),
            "observing sub-connection"
        );
        sub
    }
}

#[async_trait]
impl<'a> MultiplexedConnection for ObservedMultiplexedConnection<'a> {
    fn connection_id(&self) -> &str {
        self.inner.connection_id()
    }

    fn set_connection_id(&mut self, connection_id: String) {
        self.inner.set_connection_id(connection_id);
    }

    fn features(&self) -> &Features {
        self.inner.features()
    }

    fn features_mut(&mut self) -> &mut Features {
        self.inner.features_mut()
    }

    fn items(&self) -> &Items {
        self.inner.items()
    }

    fn items_mut(&mut self) -> &mut Items {
        self.inner.items_mut()
    }

    fn set_items(&mut self, items: Items) {
        self.inner.set_items(items);
    }

    // Forwarded rather than defaulted so the inner connection picks its own reason.
    fn abort(&self) {
        self.inner.abort();
    }

    fn abort_with(&self, reason: ConnectionAborted) {
        self.inner.abort_with(reason);
    }

    async fn accept(&self, cancel: &CancellationToken) -> Result<Option<ConnectionContext>, Error> {
        let accepted = self.inner.accept(cancel).await?;
        Ok(accepted.map(|sub| self.observe(sub)))
    }

    async fn connect(
        &self,
        features: Option<Features>,
        cancel: &CancellationToken,
    ) -> Result<ConnectionContext, Error> {
        let sub = self.inner.connect(features, cancel).await?;
        Ok(self.observe(sub))
    }
}
