//! The byte transport underneath a connection.
//!
//! A transport is two independent directions. Each side is a trait object
//! behind an `Arc`, so a [`DuplexTransport`] is a cheap handle: cloning it
//! shares the same sides, and [`DuplexTransport::ptr_eq`] tells whether two
//! handles name the very same transport.
//!
//! Sides take `&self`. Implementations serialise their own access, which lets
//! a read and a write on the same connection be in flight at once.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

/// The readable direction of a transport.
#[async_trait]
pub trait TransportInput: Send + Sync {
    /// Reads into `buf`, returning how many bytes were filled.
    ///
    /// `Ok(0)` with a non-empty `buf` means the peer finished sending.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Stops reading. Closing an already-closed side must succeed.
    async fn close(&self) -> io::Result<()>;
}

/// The writable direction of a transport.
#[async_trait]
pub trait TransportOutput: Send + Sync {
    /// Writes all of `buf`.
    async fn write(&self, buf: &[u8]) -> io::Result<()>;

    async fn flush(&self) -> io::Result<()>;

    /// Flushes and finishes the direction. Closing twice must succeed.
    async fn close(&self) -> io::Result<()>;
}

#[async_trait]
impl<T: TransportInput + ?Sized> TransportInput for Arc<T> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf).await
    }

    async fn close(&self) -> io::Result<()> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: TransportOutput + ?Sized> TransportOutput for Arc<T> {
    async fn write(&self, buf: &[u8]) -> io::Result<()> {
        (**self).write(buf).await
    }

    async fn flush(&self) -> io::Result<()> {
        (**self).flush().await
    }

    async fn close(&self) -> io::Result<()> {
        (**self).close().await
    }
}

/// A bidirectional byte transport: one readable and one writable side.
#[derive(Clone)]
pub struct DuplexTransport {
    input: Arc<dyn TransportInput>,
    output: Arc<dyn TransportOutput>,
}

impl DuplexTransport {
    pub fn new(input: Arc<dyn TransportInput>, output: Arc<dyn TransportOutput>) -> Self {
        Self { input, output }
    }

    /// Splits a tokio I/O object (a `TcpStream`, a `DuplexStream`, ...) into a transport.
    pub fn from_io<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::new(
            Arc::new(IoInput::new(reader)),
            Arc::new(IoOutput::new(writer)),
        )
    }

    pub fn input(&self) -> &Arc<dyn TransportInput> {
        &self.input
    }

    pub fn output(&self) -> &Arc<dyn TransportOutput> {
        &self.output
    }

    /// Whether both handles share the same two sides.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.input, &other.input) && Arc::ptr_eq(&self.output, &other.output)
    }

    /// Closes both directions. The output is closed even if closing the input failed;
    /// the first error is returned.
    pub async fn close(&self) -> io::Result<()> {
        let input = self.input.close().await;
        let output = self.output.close().await;
        input.and(output)
    }
}

impl fmt::Debug for DuplexTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexTransport")
            .field("input", &Arc::as_ptr(&self.input).cast::<()>())
            .field("output", &Arc::as_ptr(&self.output).cast::<()>())
            .finish()
    }
}

// ── tokio-backed sides ────────────────────────────────────────────────────────

fn closed(direction: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, format!("transport {direction} closed"))
}

/// Readable side over the read half of a tokio I/O object.
///
/// `None` once closed; the half is dropped at that point.
struct IoInput<T> {
    reader: Mutex<Option<ReadHalf<T>>>,
}

impl<T> IoInput<T> {
    fn new(reader: ReadHalf<T>) -> Self {
        Self { reader: Mutex::new(Some(reader)) }
    }
}

#[async_trait]
impl<T: AsyncRead + Send + 'static> TransportInput for IoInput<T> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().await;
        match reader.as_mut() {
            Some(reader) => reader.read(buf).await,
            None => Err(closed("input")),
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.reader.lock().await.take();
        Ok(())
    }
}

struct IoOutput<T> {
    writer: Mutex<Option<WriteHalf<T>>>,
}

impl<T> IoOutput<T> {
    fn new(writer: WriteHalf<T>) -> Self {
        Self { writer: Mutex::new(Some(writer)) }
    }
}

#[async_trait]
impl<T: AsyncWrite + Send + 'static> TransportOutput for IoOutput<T> {
    async fn write(&self, buf: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => writer.write_all(buf).await,
            None => Err(closed("output")),
        }
    }

    async fn flush(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => writer.flush().await,
            None => Err(closed("output")),
        }
    }

    async fn close(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.take() {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn from_io_moves_bytes_both_ways() {
        let (local, mut remote) = tokio::io::duplex(64);
        let transport = DuplexTransport::from_io(local);

        transport.output().write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 8];
        let n = transport.input().read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_signals_eof() {
        let (local, mut remote) = tokio::io::duplex(64);
        let transport = DuplexTransport::from_io(local);

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let err = transport.output().write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let err = transport.input().read(&mut [0u8; 1]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn clones_are_identical_and_fresh_transports_are_not() {
        let (a, _) = tokio::io::duplex(8);
        let (b, _) = tokio::io::duplex(8);
        let first = DuplexTransport::from_io(a);
        let second = DuplexTransport::from_io(b);

        assert!(first.ptr_eq(&first.clone()));
        assert!(!first.ptr_eq(&second));
    }
}
