//! A transport side that reports every completed operation.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::observation::{Direction, ObservationEvent, ObservationOptions, ObservationSink};
use crate::transport::{TransportInput, TransportOutput};

/// Wraps one side of a transport and emits an [`ObservationEvent`] per
/// successful read or write.
///
/// Bytes pass through untouched. A failed call is returned as-is and emits
/// nothing. Events for one side are emitted in completion order.
pub struct ObservableStream<S> {
    inner: S,
    sink: Arc<dyn ObservationSink>,
    sample_limit: usize,
    closed: AtomicBool,
    detached: AtomicBool,
}

impl<S> ObservableStream<S> {
    pub fn new(inner: S, sink: Arc<dyn ObservationSink>, options: ObservationOptions) -> Self {
        Self {
            inner,
            sink,
            sample_limit: options.sample_limit(),
            closed: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cuts this wrapper off from the inner side without closing it.
    ///
    /// Afterwards every call fails with `NotConnected` and reaches neither the
    /// inner side nor the sink.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn check_attached(&self) -> io::Result<()> {
        if self.is_detached() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "observed transport used after its scope ended",
            ));
        }
        Ok(())
    }

    fn emit(&self, direction: Direction, transferred: &[u8]) {
        self.sink
            .record(ObservationEvent::capture(direction, transferred, self.sample_limit));
    }

    /// Returns `true` for the first caller only.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

#[async_trait]
impl<S: TransportInput> TransportInput for ObservableStream<S> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_attached()?;
        let n = self.inner.read(buf).await?;
        self.emit(Direction::Read, &buf[..n.min(buf.len())]);
        Ok(n)
    }

    async fn close(&self) -> io::Result<()> {
        self.check_attached()?;
        if !self.mark_closed() {
            return Ok(());
        }
        self.inner.close().await
    }
}

#[async_trait]
impl<S: TransportOutput> TransportOutput for ObservableStream<S> {
    async fn write(&self, buf: &[u8]) -> io::Result<()> {
        self.check_attached()?;
        self.inner.write(buf).await?;
        self.emit(Direction::Write, buf);
        Ok(())
    }

    async fn flush(&self) -> io::Result<()> {
        self.check_attached()?;
        self.inner.flush().await
    }

    async fn close(&self) -> io::Result<()> {
        self.check_attached()?;
        if !self.mark_closed() {
            return Ok(());
        }
        self.inner.close().await
    }
}

impl<S> fmt::Debug for ObservableStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableStream")
            .field("sample_limit", &self.sample_limit)
            .field("closed", &self.is_closed())
            .field("detached", &self.is_detached())
            .finish()
    }
}
