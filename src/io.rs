//! A transport seen as a tokio I/O object.
//!
//! Protocol libraries such as hyper expect `AsyncRead + AsyncWrite`.
//! [`TransportIo`] drives the async transport sides from those poll methods
//! by keeping at most one in-flight future per operation. Each future owns an
//! `Arc` to its side and its own copy of the bytes, so it is `'static` and can
//! be stored between polls.
//!
//! A write that returned `Pending` keeps going even if the caller gives up on
//! it. The next `poll_write` either is the retry (its buffer starts with the
//! in-flight bytes) and reports that write's length, or brings different
//! bytes, in which case the old write lands first and a new one is started.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::handler::BoxFuture;
use crate::transport::{DuplexTransport, TransportInput, TransportOutput};

type Pending<T> = Option<BoxFuture<'static, io::Result<T>>>;

/// A started write and the bytes it is carrying.
struct InFlightWrite {
    data: Bytes,
    fut: BoxFuture<'static, io::Result<()>>,
}

/// `AsyncRead + AsyncWrite` over a [`DuplexTransport`].
///
/// A read fetches up to the caller's buffer size; anything the caller could
/// not take on a later, smaller poll is kept and served first next time.
/// A write returns `Ready` only after the whole buffer reached the transport.
pub struct TransportIo {
    transport: DuplexTransport,
    leftover: Bytes,
    read: Pending<Bytes>,
    write: Option<InFlightWrite>,
    flush: Pending<()>,
    shutdown: Pending<()>,
}

impl TransportIo {
    pub fn new(transport: DuplexTransport) -> Self {
        Self {
            transport,
            leftover: Bytes::new(),
            read: None,
            write: None,
            flush: None,
            shutdown: None,
        }
    }

    pub fn transport(&self) -> &DuplexTransport {
        &self.transport
    }
}

/// Polls the pending operation, creating it with `start` if there is none.
fn drive<T>(
    slot: &mut Pending<T>,
    cx: &mut Context<'_>,
    start: impl FnOnce() -> BoxFuture<'static, io::Result<T>>,
) -> Poll<io::Result<T>> {
    let fut = slot.get_or_insert_with(start);
    let output = ready!(fut.as_mut().poll(cx));
    *slot = None;
    Poll::Ready(output)
}

impl AsyncRead for TransportIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.leftover.is_empty() {
            let input = Arc::clone(this.transport.input());
            let capacity = buf.remaining();
            this.leftover = ready!(drive(&mut this.read, cx, || {
                Box::pin(async move {
                    let mut chunk = vec![0u8; capacity];
                    let n = input.read(&mut chunk).await?;
                    chunk.truncate(n);
                    Ok(Bytes::from(chunk))
                })
            }))?;
        }

        let n = this.leftover.len().min(buf.remaining());
        buf.put_slice(&this.leftover[..n]);
        this.leftover.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for TransportIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Some(pending) = &mut this.write {
            let retry = buf.starts_with(&pending.data);
            let result = ready!(pending.fut.as_mut().poll(cx));
            let n = pending.data.len();
            this.write = None;
            if retry {
                return Poll::Ready(result.map(|()| n));
            }
            result?;
        }

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let data = Bytes::copy_from_slice(buf);
        let output = Arc::clone(this.transport.output());
        let carried = data.clone();
        let fut: BoxFuture<'static, io::Result<()>> =
            Box::pin(async move { output.write(&carried).await });
        let pending = this.write.insert(InFlightWrite { data, fut });

        let result = ready!(pending.fut.as_mut().poll(cx));
        let n = pending.data.len();
        this.write = None;
        Poll::Ready(result.map(|()| n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let output = Arc::clone(this.transport.output());
        drive(&mut this.flush, cx, || Box::pin(async move { output.flush().await }))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let output = Arc::clone(this.transport.output());
        drive(&mut this.shutdown, cx, || Box::pin(async move { output.close().await }))
    }
}

impl fmt::Debug for TransportIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportIo")
            .field("transport", &self.transport)
            .field("buffered", &self.leftover.len())
            .field("writing", &self.write.as_ref().map(|w| w.data.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn bytes_round_trip_through_the_adapter() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut io = TransportIo::new(DuplexTransport::from_io(local));

        io.write_all(b"over the adapter").await.unwrap();
        io.flush().await.unwrap();
        let mut buf = [0u8; 16];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"over the adapter");

        remote.write_all(b"back").await.unwrap();
        drop(remote);
        let mut received = Vec::new();
        io.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"back");
    }

    #[tokio::test]
    async fn reads_respect_the_caller_buffer_size() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut io = TransportIo::new(DuplexTransport::from_io(local));
        remote.write_all(b"abcdef").await.unwrap();

        let mut first = [0u8; 64];
        let n = io.read(&mut first).await.unwrap();
        assert_eq!(&first[..n], b"abcdef");

        remote.write_all(b"ghij").await.unwrap();
        let mut two = [0u8; 2];
        io.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"gh");
        io.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"ij");
    }

    #[tokio::test]
    async fn shutdown_closes_the_output() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut io = TransportIo::new(DuplexTransport::from_io(local));
        io.shutdown().await.unwrap();

        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn abandoned_write_lands_before_the_next_one() {
        let (local, mut remote) = tokio::io::duplex(4);
        let mut io = TransportIo::new(DuplexTransport::from_io(local));

        // Only 4 of 8 bytes fit; the caller then walks away from this write.
        let first = std::future::poll_fn(|cx| {
            Poll::Ready(Pin::new(&mut io).poll_write(cx, b"AAAAAAAA"))
        })
        .await;
        assert!(first.is_pending());

        let drain = tokio::spawn(async move {
            let mut wire = [0u8; 10];
            remote.read_exact(&mut wire).await.unwrap();
            wire
        });

        let n = std::future::poll_fn(|cx| Pin::new(&mut io).poll_write(cx, b"BB")).await.unwrap();
        assert_eq!(n, 2);
        io.flush().await.unwrap();

        assert_eq!(&drain.await.unwrap(), b"AAAAAAAABB");
    }

    #[tokio::test]
    async fn retried_write_reports_its_own_length() {
        let (local, mut remote) = tokio::io::duplex(4);
        let mut io = TransportIo::new(DuplexTransport::from_io(local));

        let first = std::future::poll_fn(|cx| {
            Poll::Ready(Pin::new(&mut io).poll_write(cx, b"CCCCCC"))
        })
        .await;
        assert!(first.is_pending());

        let drain = tokio::spawn(async move {
            let mut wire = [0u8; 6];
            remote.read_exact(&mut wire).await.unwrap();
            wire
        });

        // Same bytes plus more: the retry finishes the original six only.
        let n = std::future::poll_fn(|cx| Pin::new(&mut io).poll_write(cx, b"CCCCCCDD"))
            .await
            .unwrap();
        assert_eq!(n, 6);
        assert_eq!(&drain.await.unwrap(), b"CCCCCC");
    }
}
