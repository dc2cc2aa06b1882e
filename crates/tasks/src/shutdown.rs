use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation token. Cloning shares the signal; `send` trips
/// it for every holder at once and is idempotent.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    fired: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self) {
        self.fired.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Relaxed)
    }

    pub fn guard(&self) -> ShutdownGuard {
        ShutdownGuard {
            signal: self.clone(),
        }
    }
}

/// What a task holds to observe cancellation. Suspending calls should race
/// against [`ShutdownGuard::wait_for_shutdown`] and unwind when it resolves.
#[derive(Clone, Debug)]
pub struct ShutdownGuard {
    signal: ShutdownSignal,
}

impl ShutdownGuard {
    pub fn should_shutdown(&self) -> bool {
        self.signal.is_fired()
    }

    pub async fn wait_for_shutdown(&self) {
        while !self.signal.is_fired() {
            self.signal.notify.notified().await;
        }
    }
}
