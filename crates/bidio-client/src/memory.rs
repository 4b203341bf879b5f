//! In-memory transport and timers for tests.
//!
//! [`MemoryConnector`] hands out [`MemoryConnection`]s that record what the
//! client does with them and let a test play the server: deliver inbound
//! events and answer acknowledgements. Connections are cached per address,
//! like a multiplexing transport, unless a new connection is forced.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::timer::{Timer, TimerTask};
use crate::transport::{
    AckHandler, ConnectOptions, Connection, Connector, EventHandler, ListenerId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One event emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
    /// Whether an acknowledgement handler was attached.
    pub acknowledged: bool,
}

#[derive(Default)]
struct ConnectionState {
    next_listener: u64,
    listeners: Vec<(String, ListenerId, EventHandler)>,
    emitted: Vec<Emitted>,
    pending: Vec<AckHandler>,
    connected: bool,
    disconnects: usize,
    reconnects: usize,
}

/// Recording connection driven by the test.
pub struct MemoryConnection {
    url: Url,
    state: Mutex<ConnectionState>,
}

impl MemoryConnection {
    /// Creates a connected connection to `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            state: Mutex::new(ConnectionState {
                connected: true,
                ..ConnectionState::default()
            }),
        }
    }

    /// Address the connection was opened for.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Invokes every listener registered for `event` with `payload`.
    ///
    /// Returns the number of listeners invoked.
    pub fn deliver(&self, event: &str, payload: &Value) -> usize {
        let handlers: Vec<EventHandler> = lock(&self.state)
            .listeners
            .iter()
            .filter(|(name, _, _)| name == event)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Answers the oldest unanswered acknowledgement with `reply`.
    ///
    /// Returns `false` when no acknowledgement is pending.
    pub fn acknowledge(&self, reply: Value) -> bool {
        let handler = {
            let mut state = lock(&self.state);
            if state.pending.is_empty() {
                return false;
            }
            state.pending.remove(0)
        };
        handler(reply);
        true
    }

    /// Acknowledgements awaiting an answer.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Everything emitted so far, oldest first.
    #[must_use]
    pub fn emitted(&self) -> Vec<Emitted> {
        lock(&self.state).emitted.clone()
    }

    /// Listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.state)
            .listeners
            .iter()
            .filter(|(name, _, _)| name == event)
            .count()
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Times [`Connection::disconnect`] was called.
    #[must_use]
    pub fn disconnects(&self) -> usize {
        lock(&self.state).disconnects
    }

    /// Times [`Connection::reconnect`] was called.
    #[must_use]
    pub fn reconnects(&self) -> usize {
        lock(&self.state).reconnects
    }
}

impl Connection for MemoryConnection {
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId {
        let mut state = lock(&self.state);
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push((event.to_owned(), id, handler));
        id
    }

    fn remove_listener(&self, event: &str, listener: ListenerId) {
        lock(&self.state)
            .listeners
            .retain(|(name, id, _)| !(name == event && *id == listener));
    }

    fn emit(&self, event: &str, payload: Value, ack: Option<AckHandler>) {
        let mut state = lock(&self.state);
        state.emitted.push(Emitted {
            event: event.to_owned(),
            payload,
            acknowledged: ack.is_some(),
        });
        if let Some(ack) = ack {
            state.pending.push(ack);
        }
    }

    fn disconnect(&self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.disconnects += 1;
    }

    fn reconnect(&self) {
        let mut state = lock(&self.state);
        state.connected = true;
        state.reconnects += 1;
    }
}

/// Connector recording every connect call.
#[derive(Default)]
pub struct MemoryConnector {
    calls: Mutex<Vec<(Url, ConnectOptions)>>,
    connections: Mutex<Vec<Arc<MemoryConnection>>>,
}

impl MemoryConnector {
    /// Creates an empty connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `connect` call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<(Url, ConnectOptions)> {
        lock(&self.calls).clone()
    }

    /// Every distinct connection handed out, oldest first.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<MemoryConnection>> {
        lock(&self.connections).clone()
    }

    /// Most recent connection opened for `url`.
    #[must_use]
    pub fn connection(&self, url: &str) -> Option<Arc<MemoryConnection>> {
        lock(&self.connections)
            .iter()
            .rev()
            .find(|connection| connection.url().as_str() == url)
            .map(Arc::clone)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &Url, options: &ConnectOptions) -> Arc<dyn Connection> {
        lock(&self.calls).push((url.clone(), options.clone()));
        let mut connections = lock(&self.connections);
        let cached = if options.force_new_connection {
            None
        } else {
            connections
                .iter()
                .rev()
                .find(|connection| connection.url() == url)
                .map(Arc::clone)
        };
        cached.unwrap_or_else(|| {
            let connection = Arc::new(MemoryConnection::new(url.clone()));
            connections.push(Arc::clone(&connection));
            connection
        })
    }
}

/// Timer running tasks synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateTimer;

impl Timer for ImmediateTimer {
    fn schedule(&self, _delay: Duration, task: TimerTask) {
        task();
    }
}

/// Timer queueing tasks until the test fires them.
#[derive(Default)]
pub struct ManualTimer {
    queue: Mutex<Vec<(Duration, TimerTask)>>,
}

impl ManualTimer {
    /// Creates an empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of the queued tasks.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.queue).iter().map(|(delay, _)| *delay).collect()
    }

    /// Runs every queued task; returns how many ran.
    pub fn fire_all(&self) -> usize {
        let tasks: Vec<_> = lock(&self.queue).drain(..).collect();
        let count = tasks.len();
        for (_, task) in tasks {
            task();
        }
        count
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) {
        lock(&self.queue).push((delay, task));
    }
}
