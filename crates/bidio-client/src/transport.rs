//! Capabilities the client consumes from the underlying transport.
//!
//! The client never speaks a wire protocol itself. It needs an object that
//! can open connections ([`Connector`]) and, per connection, register and
//! remove event listeners, emit events with an optional acknowledgement
//! handler, and disconnect ([`Connection`]). Any event-based bidirectional
//! transport with built-in reply correlation fits.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Handle identifying one registered listener on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Listener invoked for every occurrence of an event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// One-shot handler receiving the acknowledgement of an emitted event.
pub type AckHandler = Box<dyn FnOnce(Value) + Send>;

/// Event name of the server's reload signal.
pub const RELOAD_EVENT: &str = "reload";

/// One live connection to a resource path.
///
/// Implementations invoke listeners on their event-processing thread, in the
/// order events arrive.
pub trait Connection: Send + Sync {
    /// Registers `handler` for `event`.
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId;

    /// Removes a listener previously returned by [`Connection::on`].
    fn remove_listener(&self, event: &str, listener: ListenerId);

    /// Emits `event` with `payload`. When `ack` is supplied the transport
    /// invokes it with the server's reply.
    fn emit(&self, event: &str, payload: Value, ack: Option<AckHandler>);

    /// Closes the connection.
    fn disconnect(&self);

    /// Re-establishes a closed connection.
    fn reconnect(&self);
}

/// Opens connections; the client's view of the transport library.
///
/// Connecting is not fallible here: transports report failures through the
/// `connect_failed` lifecycle event instead.
pub trait Connector: Send + Sync {
    /// Opens (or reuses) a connection to `url`.
    fn connect(&self, url: &Url, options: &ConnectOptions) -> Arc<dyn Connection>;
}

/// Options forwarded to the transport when connecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Ask the transport for a dedicated connection instead of a shared one.
    #[serde(default, rename = "force new connection")]
    pub force_new_connection: bool,
    /// Transport-specific options passed through untouched.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Transport lifecycle events a channel forwards to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Raw message received.
    Message,
    /// Connection closed.
    Close,
    /// Connection established.
    Connect,
    /// Connection attempt started.
    Connecting,
    /// Connection attempt failed.
    ConnectFailed,
    /// Connection re-established.
    Reconnect,
    /// Reconnection attempt started.
    Reconnecting,
    /// Reconnection gave up.
    ReconnectFailed,
    /// Connection lost or closed.
    Disconnect,
}

impl LifecycleEvent {
    /// Every forwarded event.
    pub const ALL: [Self; 9] = [
        Self::Message,
        Self::Close,
        Self::Connect,
        Self::Connecting,
        Self::ConnectFailed,
        Self::Reconnect,
        Self::Reconnecting,
        Self::ReconnectFailed,
        Self::Disconnect,
    ];

    /// Transport event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Close => "close",
            Self::Connect => "connect",
            Self::Connecting => "connecting",
            Self::ConnectFailed => "connect_failed",
            Self::Reconnect => "reconnect",
            Self::Reconnecting => "reconnecting",
            Self::ReconnectFailed => "reconnect_failed",
            Self::Disconnect => "disconnect",
        }
    }

    /// Looks an event up by its transport name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
