//! Connection registry handing out one [`Channel`] per name.
//!
//! The manager owns the transport connector, the resolved configuration, and
//! the optional parent connection opened with [`Manager::connect`]. Channels
//! joined afterwards receive that parent for the reload protocol.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use url::Url;

use bidio_config::{Config, channel_url};

use crate::channel::{Channel, ChannelSettings};
use crate::error::ManagerError;
use crate::timer::{ThreadTimer, Timer};
use crate::transport::{ConnectOptions, Connection, Connector};

const MANAGER_TARGET: &str = "bidio_client::manager";

/// Address used by [`Manager::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectTarget {
    /// The configured base address.
    #[default]
    Default,
    /// An explicit address.
    Url(Url),
}

impl From<Url> for ConnectTarget {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

/// Options for [`Manager::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinOptions {
    /// Open a dedicated connection and replace any cached channel. The flag
    /// also sticks to the manager's options for later joins.
    pub force_new_connection: bool,
}

impl JoinOptions {
    /// Options forcing a new connection.
    #[must_use]
    pub const fn force_new_connection() -> Self {
        Self {
            force_new_connection: true,
        }
    }
}

#[derive(Default)]
struct Registry {
    options: ConnectOptions,
    parent: Option<Arc<dyn Connection>>,
    channels: BTreeMap<String, Channel>,
}

/// Caches channels by name over a shared connector.
pub struct Manager {
    connector: Arc<dyn Connector>,
    timer: Arc<dyn Timer>,
    config: Config,
    base: Url,
    registry: Mutex<Registry>,
}

impl Manager {
    /// Creates a manager for the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::BaseAddress`] when the configured address is
    /// not a URL.
    pub fn new(connector: Arc<dyn Connector>, config: Config) -> Result<Self, ManagerError> {
        let base = config.base_url().map_err(ManagerError::BaseAddress)?;
        Ok(Self {
            connector,
            timer: Arc::new(ThreadTimer),
            config,
            base,
            registry: Mutex::new(Registry::default()),
        })
    }

    /// Replaces the timer used by the reload protocol.
    #[must_use]
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    /// Replaces the options passed to the transport for every channel.
    #[must_use]
    pub fn with_options(self, options: ConnectOptions) -> Self {
        self.registry().options = options;
        self
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration the manager was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Parsed base address.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// Options currently passed to the transport.
    #[must_use]
    pub fn options(&self) -> ConnectOptions {
        self.registry().options.clone()
    }

    /// Parent connection opened by [`Manager::connect`], if any.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<dyn Connection>> {
        self.registry().parent.clone()
    }

    /// Opens the shared parent connection and remembers it for reloads.
    ///
    /// `options` go to the transport for this connection only.
    pub fn connect(&self, target: ConnectTarget, options: &ConnectOptions) -> Arc<dyn Connection> {
        let url = match target {
            ConnectTarget::Default => self.base.clone(),
            ConnectTarget::Url(url) => url,
        };
        info!(target: MANAGER_TARGET, url = %url, "opening parent connection");
        let connection = self.connector.connect(&url, options);
        self.registry().parent = Some(Arc::clone(&connection));
        connection
    }

    /// Returns the channel called `name`, creating and connecting it when it
    /// is not cached or when a new connection is forced.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Address`] when `name` cannot be appended to
    /// the base address.
    pub fn join(&self, name: &str, options: JoinOptions) -> Result<Channel, ManagerError> {
        debug!(
            target: MANAGER_TARGET,
            channel = name,
            force_new_connection = options.force_new_connection,
            "joining channel"
        );
        let (connect_options, parent) = {
            let mut registry = self.registry();
            if options.force_new_connection {
                registry.options.force_new_connection = true;
            } else if let Some(channel) = registry.channels.get(name) {
                return Ok(channel.clone());
            }
            (registry.options.clone(), registry.parent.clone())
        };

        let url = channel_url(&self.base, name).map_err(|source| ManagerError::Address {
            name: name.to_owned(),
            source,
        })?;
        let channel = Channel::attach(ChannelSettings {
            name: name.to_owned(),
            namespace: self.config.namespace().to_owned(),
            url,
            options: connect_options,
            connector: Arc::clone(&self.connector),
            parent,
            timer: Arc::clone(&self.timer),
            reload_grace: self
                .config
                .reload_on_signal()
                .then(|| self.config.reload_grace()),
        });

        let winner = {
            let mut registry = self.registry();
            match registry.channels.get(name) {
                Some(existing) if !options.force_new_connection => Some(existing.clone()),
                _ => {
                    registry.channels.insert(name.to_owned(), channel.clone());
                    None
                }
            }
        };
        let Some(existing) = winner else {
            return Ok(channel);
        };
        // A concurrent join cached the name first.
        debug!(target: MANAGER_TARGET, channel = name, "discarding duplicate join");
        channel.disconnect();
        Ok(existing)
    }

    /// Disconnects and forgets the channel called `name`.
    ///
    /// Unknown names are a no-op that returns `None`.
    pub fn leave(&self, name: &str) -> Option<Channel> {
        let Some(channel) = self.registry().channels.remove(name) else {
            debug!(target: MANAGER_TARGET, channel = name, "no channel to leave");
            return None;
        };
        debug!(target: MANAGER_TARGET, channel = name, "leaving channel");
        channel.disconnect();
        Some(channel)
    }

    /// Cached channel called `name`.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<Channel> {
        let channel = self.registry().channels.get(name).cloned();
        if channel.is_none() {
            debug!(target: MANAGER_TARGET, channel = name, "channel does not exist");
        }
        channel
    }

    /// Number of cached channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().channels.len()
    }

    /// Returns `true` when no channel is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().channels.is_empty()
    }

    /// Names of the cached channels in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.registry().channels.keys().cloned().collect()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("base", &self.base.as_str())
            .field("namespace", &self.config.namespace())
            .field("channels", &self.names())
            .finish_non_exhaustive()
    }
}
