//! Deferred execution used by the reload protocol.

use std::thread;
use std::time::Duration;

use tracing::warn;

const TIMER_TARGET: &str = "bidio_client::timer";

/// Task run once its delay has elapsed.
pub type TimerTask = Box<dyn FnOnce() + Send>;

/// Runs a task after a delay without blocking the caller.
pub trait Timer: Send + Sync {
    /// Schedules `task` to run once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: TimerTask);
}

/// Timer that sleeps on a dedicated thread per task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) {
        let spawned = thread::Builder::new()
            .name("bidio-timer".into())
            .spawn(move || {
                thread::sleep(delay);
                task();
            });
        if let Err(error) = spawned {
            warn!(
                target: TIMER_TARGET,
                delay_ms = delay.as_millis(),
                %error,
                "failed to spawn timer thread; task dropped"
            );
        }
    }
}
