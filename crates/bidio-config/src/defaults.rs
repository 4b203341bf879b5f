use crate::logging::LogFormat;

/// Default server address used when nothing else is configured.
pub const DEFAULT_URL: &str = "http://localhost:3000";

/// Default event name carrying stream packets.
pub const DEFAULT_NAMESPACE: &str = "stream";

/// Default reconnection grace period, in milliseconds, after a reload.
pub const DEFAULT_RELOAD_GRACE_MS: u64 = 100;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned default server address (e.g. for serde defaults).
pub fn default_url() -> String {
    DEFAULT_URL.to_owned()
}

/// Owned default namespace.
pub fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required.
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
