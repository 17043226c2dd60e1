//! Observation over both directions of a transport.

use std::sync::Arc;

use super::observation::{ObservationOptions, ObservationSink};
use super::stream::ObservableStream;
use crate::transport::{DuplexTransport, TransportInput, TransportOutput};

/// A [`DuplexTransport`] whose input and output are each an [`ObservableStream`].
///
/// Built fresh per connection scope. [`transport`](Self::transport) is what
/// gets installed on the connection; [`dispose`](Self::dispose) ends the scope.
pub struct ObservableDuplexTransport {
    original: DuplexTransport,
    input: Arc<ObservableStream<Arc<dyn TransportInput>>>,
    output: Arc<ObservableStream<Arc<dyn TransportOutput>>>,
}

impl ObservableDuplexTransport {
    pub fn new(
        original: DuplexTransport,
        sink: Arc<dyn ObservationSink>,
        options: ObservationOptions,
    ) -> Self {
        let input = Arc::new(ObservableStream::new(
            Arc::clone(original.input()),
            Arc::clone(&sink),
            options,
        ));
        let output = Arc::new(ObservableStream::new(
            Arc::clone(original.output()),
            sink,
            options,
        ));
        Self { original, input, output }
    }

    /// The wrapped transport.
    pub fn original(&self) -> &DuplexTransport {
        &self.original
    }

    /// The observed transport, as a handle ready to install on a connection.
    pub fn transport(&self) -> DuplexTransport {
        DuplexTransport::new(
            Arc::clone(&self.input) as Arc<dyn TransportInput>,
            Arc::clone(&self.output) as Arc<dyn TransportOutput>,
        )
    }

    /// Ends the scope: both observed sides stop forwarding.
    ///
    /// The original transport is left open. Calling this again does nothing.
    pub fn dispose(&self) {
        self.input.detach();
        self.output.detach();
    }

    pub async fn dispose_async(&self) {
        self.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.input.is_detached() && self.output.is_detached()
    }
}
