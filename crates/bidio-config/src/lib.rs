//! Shared configuration for the bid stream client.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file, then `BIDIO_*` environment variables, and
//! finally command-line flags. Applications embedding the client usually call
//! [`Config::load`] once during start-up and hand the result to the channel
//! manager.

mod address;
mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use url::Url;

pub use address::{AddressError, channel_url};
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_NAMESPACE, DEFAULT_RELOAD_GRACE_MS, DEFAULT_URL,
    default_log_filter, default_log_filter_string, default_log_format, default_namespace,
    default_url,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BIDIO")]
pub struct Config {
    /// Base address of the bid server; channel names are appended to its path.
    #[ortho_config(default = defaults::default_url())]
    pub url: String,
    /// Event name carrying stream packets and requests.
    #[ortho_config(default = defaults::default_namespace())]
    pub namespace: String,
    /// Whether channels honour the server's `reload` signal.
    #[ortho_config(default = true)]
    pub reload_on_signal: bool,
    /// Delay before the parent connection reconnects after a reload.
    #[ortho_config(default = defaults::DEFAULT_RELOAD_GRACE_MS)]
    pub reload_grace_ms: u64,
    /// Tracing filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Tracing output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: defaults::default_url(),
            namespace: defaults::default_namespace(),
            reload_on_signal: true,
            reload_grace_ms: defaults::DEFAULT_RELOAD_GRACE_MS,
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments, `BIDIO_*` variables,
    /// and an optional configuration file.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when a layer fails to parse or a value has
    /// the wrong type.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration treating `args` as the command line.
    ///
    /// The first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when a layer fails to parse or a value has
    /// the wrong type.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Raw base address as configured.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Parses the configured base address.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidBase`] when the address is not a URL.
    pub fn base_url(&self) -> Result<Url, AddressError> {
        Url::parse(&self.url).map_err(|source| AddressError::InvalidBase {
            address: self.url.clone(),
            source,
        })
    }

    /// Event name used for stream packets.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Whether the reload protocol is enabled.
    #[must_use]
    pub const fn reload_on_signal(&self) -> bool {
        self.reload_on_signal
    }

    /// Grace period before reconnecting after a reload.
    #[must_use]
    pub const fn reload_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reload_grace_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Tracing output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
