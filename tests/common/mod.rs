#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use conntap::middleware::{Direction, ObservationEvent, ObservationSink};
use conntap::{
    CancellationToken, ConnectionAborted, ConnectionContext, DuplexTransport, Error, Features,
    Items, MultiplexedConnection,
};
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Keeps every event it is handed, in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ObservationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ObservationEvent> {
        self.events.lock().clone()
    }

    pub fn total(&self, direction: Direction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.direction == direction)
            .map(|e| e.byte_count)
            .sum()
    }

    /// Concatenated samples for one direction.
    pub fn bytes(&self, direction: Direction) -> Vec<u8> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.direction == direction)
            .filter_map(|e| e.sample.as_deref())
            .flatten()
            .copied()
            .collect()
    }
}

impl ObservationSink for RecordingSink {
    fn record(&self, event: ObservationEvent) {
        self.events.lock().push(event);
    }
}

/// A connection over an in-memory pipe; the returned stream is the peer.
pub fn pipe_connection(id: &str, capacity: usize) -> (ConnectionContext, DuplexStream) {
    let (local, remote) = tokio::io::duplex(capacity);
    (ConnectionContext::new(id, DuplexTransport::from_io(local)), remote)
}

pub const MOCK_DEFAULT_ABORT: &str = "mock connection shut down";

/// A multiplexed connection fed from a channel.
///
/// Inbound sub-connections are pushed through the sender returned by
/// [`MockMultiplexed::new`]; dropping that sender ends `accept`.
pub struct MockMultiplexed {
    pub id: String,
    pub features: Features,
    pub items: Items,
    inbound: tokio::sync::Mutex<mpsc::Receiver<ConnectionContext>>,
    pub aborts: Mutex<Vec<ConnectionAborted>>,
    pub accept_calls: AtomicUsize,
    pub refuse_connect: bool,
    pub outbound_peers: Mutex<Vec<DuplexStream>>,
}

impl MockMultiplexed {
    pub fn new(id: &str) -> (Self, mpsc::Sender<ConnectionContext>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = Self {
            id: id.to_owned(),
            features: Features::new(),
            items: Items::new(),
            inbound: tokio::sync::Mutex::new(rx),
            aborts: Mutex::new(Vec::new()),
            accept_calls: AtomicUsize::new(0),
            refuse_connect: false,
            outbound_peers: Mutex::new(Vec::new()),
        };
        (conn, tx)
    }

    pub fn accept_calls(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MultiplexedConnection for MockMultiplexed {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn set_connection_id(&mut self, connection_id: String) {
        self.id = connection_id;
    }

    fn features(&self) -> &Features {
        &self.features
    }

    fn features_mut(&mut self) -> &mut Features {
        &mut self.features
    }

    fn items(&self) -> &Items {
        &self.items
    }

    fn items_mut(&mut self) -> &mut Items {
        &mut self.items
    }

    fn abort(&self) {
        self.abort_with(ConnectionAborted::new(MOCK_DEFAULT_ABORT));
    }

    fn abort_with(&self, reason: ConnectionAborted) {
        self.aborts.lock().push(reason);
    }

    async fn accept(&self, cancel: &CancellationToken) -> Result<Option<ConnectionContext>, Error> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            sub = inbound.recv() => Ok(sub),
        }
    }

    async fn connect(
        &self,
        features: Option<Features>,
        cancel: &CancellationToken,
    ) -> Result<ConnectionContext, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.refuse_connect {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no route to peer").into());
        }
        let (local, remote) = tokio::io::duplex(1024);
        let mut peers = self.outbound_peers.lock();
        let id = format!("{}/out-{}", self.id, peers.len());
        peers.push(remote);
        let sub = ConnectionContext::new(id, DuplexTransport::from_io(local));
        Ok(match features {
            Some(features) => sub.with_features(features),
            None => sub,
        })
    }
}
