//! Connection contexts handed from stage to stage.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::error::{ConnectionAborted, Error};
use crate::features::{Features, Items};
use crate::transport::DuplexTransport;

/// Which of the two connection shapes a value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// One connection, one transport.
    Single,
    /// One physical connection carrying many sub-connections.
    Multiplexed,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::Multiplexed => "multiplexed",
        })
    }
}

/// A single connection: an id, exactly one live transport, capabilities and items.
///
/// Whoever holds `&mut ConnectionContext` owns the transport slot. A stage may
/// swap the transport for the duration of its call but must put the original
/// back before returning.
pub struct ConnectionContext {
    connection_id: String,
    transport: DuplexTransport,
    features: Features,
    items: Items,
    closed: CancellationToken,
    abort_reason: Mutex<Option<ConnectionAborted>>,
}

impl ConnectionContext {
    pub fn new(connection_id: impl Into<String>, transport: DuplexTransport) -> Self {
        Self {
            connection_id: connection_id.into(),
            transport,
            features: Features::new(),
            items: Items::new(),
            closed: CancellationToken::new(),
            abort_reason: Mutex::new(None),
        }
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn set_connection_id(&mut self, connection_id: impl Into<String>) {
        self.connection_id = connection_id.into();
    }

    pub fn transport(&self) -> &DuplexTransport {
        &self.transport
    }

    pub fn set_transport(&mut self, transport: DuplexTransport) {
        self.transport = transport;
    }

    /// Installs `transport` and hands back the one it displaced.
    pub fn replace_transport(&mut self, transport: DuplexTransport) -> DuplexTransport {
        std::mem::replace(&mut self.transport, transport)
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut Features {
        &mut self.features
    }

    pub fn items(&self) -> &Items {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Items {
        &mut self.items
    }

    pub fn set_items(&mut self, items: Items) {
        self.items = items;
    }

    /// Fires when the connection is aborted.
    pub fn connection_closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Aborts with the default reason.
    pub fn abort(&self) {
        self.abort_with(ConnectionAborted::default());
    }

    /// Aborts the connection. Only the first reason is kept.
    pub fn abort_with(&self, reason: ConnectionAborted) {
        {
            let mut slot = self.abort_reason.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(reason);
        }
        self.closed.cancel();
    }

    pub fn abort_reason(&self) -> Option<ConnectionAborted> {
        self.abort_reason.lock().clone()
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("connection_id", &self.connection_id)
            .field("transport", &self.transport)
            .field("features", &self.features)
            .field("items", &self.items)
            .field("aborted", &self.closed.is_cancelled())
            .finish()
    }
}

/// A connection that yields sub-connections instead of owning one transport.
///
/// Both [`accept`](Self::accept) and [`connect`](Self::connect) hand out full
/// [`ConnectionContext`]s, each with its own transport.
#[async_trait]
pub trait MultiplexedConnection: Send + Sync {
    fn connection_id(&self) -> &str;

    fn set_connection_id(&mut self, connection_id: String);

    fn features(&self) -> &Features;

    fn features_mut(&mut self) -> &mut Features;

    fn items(&self) -> &Items;

    fn items_mut(&mut self) -> &mut Items;

    /// Replaces the whole items map.
    fn set_items(&mut self, items: Items) {
        *self.items_mut() = items;
    }

    /// Aborts with this connection's default reason.
    fn abort(&self) {
        self.abort_with(ConnectionAborted::default());
    }

    fn abort_with(&self, reason: ConnectionAborted);

    /// Waits for the next inbound sub-connection.
    ///
    /// `Ok(None)` means no more sub-connections will arrive. Cancelling `cancel`
    /// resolves the call with [`Error::Cancelled`].
    async fn accept(&self, cancel: &CancellationToken) -> Result<Option<ConnectionContext>, Error>;

    /// Opens an outbound sub-connection, optionally requesting `features`.
    async fn connect(
        &self,
        features: Option<Features>,
        cancel: &CancellationToken,
    ) -> Result<ConnectionContext, Error>;
}

/// Either shape of connection, as handed to a stage.
pub enum Connection<'a> {
    Single(&'a mut ConnectionContext),
    Multiplexed(&'a mut dyn MultiplexedConnection),
}

impl Connection<'_> {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            Self::Single(_) => ConnectionKind::Single,
            Self::Multiplexed(_) => ConnectionKind::Multiplexed,
        }
    }

    pub fn connection_id(&self) -> &str {
        match self {
            Self::Single(conn) => conn.connection_id(),
            Self::Multiplexed(conn) => conn.connection_id(),
        }
    }

    pub fn features(&self) -> &Features {
        match self {
            Self::Single(conn) => conn.features(),
            Self::Multiplexed(conn) => conn.features(),
        }
    }

    pub fn items(&self) -> &Items {
        match self {
            Self::Single(conn) => conn.items(),
            Self::Multiplexed(conn) => conn.items(),
        }
    }
}

impl<'a> From<&'a mut ConnectionContext> for Connection<'a> {
    fn from(conn: &'a mut ConnectionContext) -> Self {
        Self::Single(conn)
    }
}
