//! Server-initiated reload of a channel and its parent connection.
//!
//! On `reload` the parent connection and the channel both disconnect. Once
//! the grace period elapses the parent reconnects and the channel attaches
//! again, keeping its watchers. Disconnecting the channel during the grace
//! period, directly or by leaving it, cancels the reattach.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{CHANNEL_TARGET, Channel};

impl Channel {
    pub(super) fn on_reload(&self) {
        let settings = &self.inner.settings;
        let Some(grace) = settings.reload_grace else {
            return;
        };
        info!(
            target: CHANNEL_TARGET,
            channel = %settings.name,
            grace_ms = grace.as_millis(),
            "server requested reload"
        );

        let parent = settings.parent.as_ref().map(Arc::clone);
        parent.as_ref().map_or_else(
            || {
                warn!(
                    target: CHANNEL_TARGET,
                    channel = %settings.name,
                    "reload without a parent connection; only the channel reconnects"
                );
            },
            |connection| connection.disconnect(),
        );
        self.inner.state().reload_pending = true;
        self.detach();

        let weak = self.weak();
        settings.timer.schedule(
            grace,
            Box::new(move || {
                if let Some(connection) = parent {
                    connection.reconnect();
                }
                if let Some(channel) = Self::from_weak(&weak) {
                    channel.finish_reload();
                }
            }),
        );
    }

    /// Reattaches after the grace period unless the channel was disconnected
    /// or left in the meantime.
    fn finish_reload(&self) {
        let pending = std::mem::take(&mut self.inner.state().reload_pending);
        if pending {
            self.connect();
        } else {
            debug!(
                target: CHANNEL_TARGET,
                channel = %self.name(),
                "reload cancelled by disconnect; staying detached"
            );
        }
    }
}
