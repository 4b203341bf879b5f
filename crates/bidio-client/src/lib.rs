//! Client for bid streams multiplexed over one bidirectional connection.
//!
//! A [`Manager`] hands out one [`Channel`] per topic name. Each channel keeps
//! an ordered subscription table: inbound stream packets
//! (`{ type, id, data }`) are decoded and delivered to every watcher whose
//! bid key and action filter match, in registration order. Request verbs
//! ([`Channel::open`], [`Channel::find`], ...) encode a request packet, emit
//! it on the channel's namespace, and route the transport's acknowledgement
//! back to the caller as a [`Reply`].
//!
//! The transport itself stays outside the crate. Implement [`Connector`] and
//! [`Connection`] for the event transport in use; the `test-support` feature
//! provides an in-memory pair for tests.
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use bidio_client::memory::{ImmediateTimer, MemoryConnector};
//! use bidio_client::{JoinOptions, Manager, watcher};
//! use bidio_config::Config;
//! use serde_json::json;
//!
//! let connector = Arc::new(MemoryConnector::new());
//! let manager = Manager::new(connector.clone(), Config::default())
//!     .expect("default address parses")
//!     .with_timer(Arc::new(ImmediateTimer));
//! let channel = manager.join("bids", JoinOptions::default()).expect("join");
//!
//! channel.watch(42, watcher(|data, action| println!("{action}: {data}")));
//! channel.open(42, Some(json!({"id": "u1"})), |reply: bidio_client::Reply| {
//!     println!("{reply:?}");
//! });
//! ```

mod action;
mod channel;
mod entity;
mod error;
mod manager;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod packet;
pub mod telemetry;
mod timer;
mod transport;

pub use action::{ActionFilter, ActionKind};
pub use channel::{Channel, Key, Reply, Responder, Selector, Watcher, watcher};
pub use entity::{EntityId, WILDCARD};
pub use error::{CodecError, ManagerError, RequestError};
pub use manager::{ConnectTarget, JoinOptions, Manager};
pub use packet::{PROTOCOL, Packet, decode, encode, request_payload};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use timer::{ThreadTimer, Timer, TimerTask};
pub use transport::{
    AckHandler, ConnectOptions, Connection, Connector, EventHandler, LifecycleEvent, ListenerId,
    RELOAD_EVENT,
};

#[cfg(test)]
mod tests;
