//! Topic router: one named channel multiplexed over the shared transport.
//!
//! A [`Channel`] owns exactly one connection to its resource path. Inbound
//! packets on the namespace event are decoded and matched against the
//! subscription table; every matching watcher fires, in registration order,
//! with the packet's payload and action. Transport lifecycle events are
//! forwarded verbatim to listeners registered with [`Channel::listen`].
//!
//! Callbacks run on the transport's event thread. The channel never holds its
//! internal lock while invoking a watcher, listener, or transport method, so
//! callbacks may freely watch, unwatch, or send.

mod dispatch;
mod reload;
mod selector;
mod table;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::packet;
use crate::timer::Timer;
use crate::transport::{
    ConnectOptions, Connection, Connector, EventHandler, LifecycleEvent, ListenerId,
    RELOAD_EVENT,
};

pub use dispatch::{Reply, Responder};
pub use selector::Selector;
pub use table::{Key, Watcher, watcher};

use table::SubscriptionTable;

pub(crate) const CHANNEL_TARGET: &str = "bidio_client::channel";

/// Everything a channel needs to acquire and manage its connection.
pub(crate) struct ChannelSettings {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) url: Url,
    pub(crate) options: ConnectOptions,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) parent: Option<Arc<dyn Connection>>,
    pub(crate) timer: Arc<dyn Timer>,
    /// Grace period of the reload protocol; `None` ignores reload signals.
    pub(crate) reload_grace: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Detached,
    Attaching,
    Attached,
}

struct Listeners {
    stream: ListenerId,
    reload: Option<ListenerId>,
}

struct State {
    connection: Arc<dyn Connection>,
    /// Set once the connection has been closed; `connect` then acquires a
    /// fresh one.
    stale: bool,
    phase: Phase,
    listeners: Option<Listeners>,
    /// A reload is waiting out its grace period. Explicit disconnects clear
    /// it so the grace task leaves the channel detached.
    reload_pending: bool,
    forwarders: HashMap<LifecycleEvent, ListenerId>,
    lifecycle: Vec<(LifecycleEvent, EventHandler)>,
    table: SubscriptionTable,
}

struct Inner {
    settings: ChannelSettings,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one topic channel; clones share the same channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Acquires a connection for `settings` and attaches to it.
    pub(crate) fn attach(settings: ChannelSettings) -> Self {
        let connection = settings.connector.connect(&settings.url, &settings.options);
        let channel = Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(State {
                    connection,
                    stale: false,
                    phase: Phase::Detached,
                    listeners: None,
                    reload_pending: false,
                    forwarders: HashMap::new(),
                    lifecycle: Vec::new(),
                    table: SubscriptionTable::default(),
                }),
            }),
        };
        channel.connect();
        channel
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn weak(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    /// Channel name as joined.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.settings.name
    }

    /// Event name carrying stream packets and requests.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.settings.namespace
    }

    /// Resource address of the channel.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.settings.url
    }

    /// Returns `true` while the stream listener is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state().phase == Phase::Attached
    }

    /// Number of subscription table entries.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.inner.state().table.len()
    }

    pub(crate) fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.inner.state().connection)
    }

    /// Attaches the stream listener, the reload listener, and every lifecycle
    /// forwarder.
    ///
    /// Calling it on a connected channel does nothing. After
    /// [`Channel::disconnect`] a fresh connection is acquired.
    pub fn connect(&self) -> &Self {
        let stale = {
            let mut state = self.inner.state();
            if state.phase != Phase::Detached {
                return self;
            }
            state.phase = Phase::Attaching;
            state.stale
        };

        let settings = &self.inner.settings;
        let connection = if stale {
            debug!(
                target: CHANNEL_TARGET,
                channel = %settings.name,
                url = %settings.url,
                "reacquiring connection"
            );
            settings.connector.connect(&settings.url, &settings.options)
        } else {
            self.connection()
        };

        let weak = self.weak();
        let route: EventHandler = Arc::new(move |message| {
            if let Some(channel) = Self::from_weak(&weak) {
                channel.on_stream(message);
            }
        });
        let stream = connection.on(&settings.namespace, route);
        let reload = settings.reload_grace.map(|_| {
            let weak = self.weak();
            let handler: EventHandler = Arc::new(move |_| {
                if let Some(channel) = Self::from_weak(&weak) {
                    channel.on_reload();
                }
            });
            connection.on(RELOAD_EVENT, handler)
        });

        let superseded = {
            let mut state = self.inner.state();
            if state.phase == Phase::Attaching {
                state.connection = Arc::clone(&connection);
                state.stale = false;
                state.listeners = Some(Listeners { stream, reload });
                state.phase = Phase::Attached;
                false
            } else {
                true
            }
        };
        if superseded {
            // Disconnected while attaching.
            connection.remove_listener(&settings.namespace, stream);
            if let Some(listener) = reload {
                connection.remove_listener(RELOAD_EVENT, listener);
            }
            return self;
        }
        for event in LifecycleEvent::ALL {
            self.bind(event);
        }
        debug!(
            target: CHANNEL_TARGET,
            channel = %settings.name,
            namespace = %settings.namespace,
            "channel connected"
        );
        self
    }

    /// Detaches every listener and closes the connection.
    ///
    /// Watchers stay registered and fire again after [`Channel::connect`].
    /// A reload waiting out its grace period no longer reattaches the
    /// channel.
    pub fn disconnect(&self) -> &Self {
        self.inner.state().reload_pending = false;
        self.detach();
        self
    }

    fn detach(&self) {
        let (connection, attached, forwarders) = {
            let mut state = self.inner.state();
            let forwarders: Vec<_> = state.forwarders.drain().collect();
            let attached = state.listeners.take();
            state.phase = Phase::Detached;
            state.stale = true;
            (Arc::clone(&state.connection), attached, forwarders)
        };

        for (event, listener) in forwarders {
            connection.remove_listener(event.as_str(), listener);
        }
        if let Some(listeners) = attached {
            connection.remove_listener(self.namespace(), listeners.stream);
            if let Some(reload) = listeners.reload {
                connection.remove_listener(RELOAD_EVENT, reload);
            }
        }
        connection.disconnect();
        debug!(target: CHANNEL_TARGET, channel = %self.name(), "channel disconnected");
    }

    /// Forwards `event` from the connection to this channel's listeners.
    ///
    /// Binding an already bound event, or binding while disconnected, does
    /// nothing.
    pub fn bind(&self, event: LifecycleEvent) -> &Self {
        let connection = {
            let state = self.inner.state();
            if state.phase != Phase::Attached || state.forwarders.contains_key(&event) {
                return self;
            }
            Arc::clone(&state.connection)
        };

        let weak = self.weak();
        let forwarder: EventHandler = Arc::new(move |payload| {
            if let Some(channel) = Self::from_weak(&weak) {
                channel.forward(event, payload);
            }
        });
        let listener = connection.on(event.as_str(), forwarder);

        let duplicate = {
            let mut state = self.inner.state();
            if state.forwarders.contains_key(&event) {
                true
            } else {
                state.forwarders.insert(event, listener);
                false
            }
        };
        if duplicate {
            connection.remove_listener(event.as_str(), listener);
        }
        self
    }

    /// Stops forwarding `event`.
    pub fn unbind(&self, event: LifecycleEvent) -> &Self {
        let removed = {
            let mut state = self.inner.state();
            state
                .forwarders
                .remove(&event)
                .map(|listener| (Arc::clone(&state.connection), listener))
        };
        if let Some((connection, listener)) = removed {
            connection.remove_listener(event.as_str(), listener);
        }
        self
    }

    /// Registers `handler` for a forwarded lifecycle event.
    pub fn listen<F>(&self, event: LifecycleEvent, handler: F) -> &Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.state().lifecycle.push((event, Arc::new(handler)));
        self
    }

    /// Removes every handler registered for `event`.
    pub fn unlisten(&self, event: LifecycleEvent) -> &Self {
        self.inner
            .state()
            .lifecycle
            .retain(|(registered, _)| *registered != event);
        self
    }

    /// Registers `watcher` for packets matching `selector`.
    ///
    /// Action names outside the whitelist are skipped; a selector left with
    /// no actions registers nothing. Never touches the network.
    pub fn watch(&self, selector: impl Into<Selector>, watcher: Watcher) -> &Self {
        let (key, actions) = selector.into().resolve();
        let added = self.inner.state().table.insert(&key, &actions, watcher);
        trace!(
            target: CHANNEL_TARGET,
            channel = %self.name(),
            key = ?key,
            actions = ?actions,
            added,
            "watch registered"
        );
        self
    }

    /// Registers `watcher` for every packet on the channel.
    pub fn watch_all(&self, watcher: Watcher) -> &Self {
        self.watch(Selector::Wildcard, watcher)
    }

    /// Removes subscriptions matching `selector`.
    ///
    /// Without `watcher` every subscription under the selector's key whose
    /// action the selector covers is removed; with it only that watcher's.
    pub fn unwatch(&self, selector: impl Into<Selector>, watcher: Option<&Watcher>) -> &Self {
        let (key, actions) = selector.into().resolve();
        let removed = self.inner.state().table.remove(&key, &actions, watcher);
        trace!(
            target: CHANNEL_TARGET,
            channel = %self.name(),
            key = ?key,
            actions = ?actions,
            removed,
            "watch removed"
        );
        self
    }

    fn on_stream(&self, message: &Value) {
        let packet = match packet::decode(message.clone()) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(
                    target: CHANNEL_TARGET,
                    channel = %self.name(),
                    %error,
                    "dropping undecodable stream packet"
                );
                return;
            }
        };

        let watchers = self
            .inner
            .state()
            .table
            .matching(packet.target(), packet.kind());
        trace!(
            target: CHANNEL_TARGET,
            channel = %self.name(),
            action = %packet.kind(),
            id = ?packet.id(),
            watchers = watchers.len(),
            "routing stream packet"
        );
        for watcher in watchers {
            watcher(packet.data(), packet.kind());
        }
    }

    fn forward(&self, event: LifecycleEvent, payload: &Value) {
        let handlers: Vec<EventHandler> = self
            .inner
            .state()
            .lifecycle
            .iter()
            .filter(|(registered, _)| *registered == event)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        trace!(
            target: CHANNEL_TARGET,
            channel = %self.name(),
            %event,
            handlers = handlers.len(),
            "forwarding lifecycle event"
        );
        for handler in handlers {
            handler(payload);
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Channel")
            .field("name", &self.inner.settings.name)
            .field("namespace", &self.inner.settings.namespace)
            .field("url", &self.inner.settings.url.as_str())
            .field("phase", &state.phase)
            .field("table", &state.table)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
