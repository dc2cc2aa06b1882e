use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::*;

use crate::shutdown::{ShutdownGuard, ShutdownSignal};

/// A critical task failed: it returned an error or panicked.
#[derive(Debug, thiserror::Error)]
#[error("critical task `{task_name}` failed: {reason}")]
pub struct FailedTaskError {
    task_name: &'static str,
    reason: String,
}

impl FailedTaskError {
    fn new(task_name: &'static str, reason: String) -> Self {
        Self { task_name, reason }
    }

    pub fn task_name(&self) -> &'static str {
        self.task_name
    }
}

fn panic_reason(err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else if let Some(s) = err.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Spawns and tracks the long-running components. The first failure is
/// reported through [`TaskManager::monitor`], which then signals every
/// sibling to shut down.
pub struct TaskManager {
    tokio_handle: Handle,
    failed_tasks_tx: mpsc::UnboundedSender<FailedTaskError>,
    failed_tasks_rx: mpsc::UnboundedReceiver<FailedTaskError>,
    shutdown_signal: ShutdownSignal,
    completion: Completion,
}

impl TaskManager {
    pub fn new(tokio_handle: Handle) -> Self {
        let (failed_tasks_tx, failed_tasks_rx) = mpsc::unbounded_channel();
        Self {
            tokio_handle,
            failed_tasks_tx,
            failed_tasks_rx,
            shutdown_signal: ShutdownSignal::new(),
            completion: Completion::new(),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            tokio_handle: self.tokio_handle.clone(),
            failed_tasks_tx: self.failed_tasks_tx.clone(),
            shutdown_signal: self.shutdown_signal.clone(),
            completion: self.completion.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Sends shutdown on ctrl-c.
    pub fn start_signal_listener(&self) {
        let shutdown_signal = self.shutdown_signal();
        self.tokio_handle.spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            warn!("got INT, initiating shutdown");
            shutdown_signal.send();
        });
    }

    /// Blocks until a critical task fails (`Err` with the failure) or
    /// shutdown is requested (`Ok`), then signals every task and waits up to
    /// `shutdown_timeout` for them to wind down.
    pub fn monitor(mut self, shutdown_timeout: Duration) -> Result<(), FailedTaskError> {
        let guard = self.shutdown_signal.guard();
        let res = self.tokio_handle.block_on(async {
            tokio::select! {
                failure = self.failed_tasks_rx.recv() => match failure {
                    Some(err) => Err(err),
                    None => Ok(()),
                },
                _ = guard.wait_for_shutdown() => Ok(()),
            }
        });

        self.shutdown_signal.send();
        let drained = self
            .tokio_handle
            .block_on(self.completion.wait_all(shutdown_timeout));
        if drained {
            debug!("gracefully shut down");
        } else {
            info!("shutdown timeout expired, exiting anyway");
        }

        res
    }
}

/// Counts live tasks so shutdown can wait for them without spinning.
#[derive(Clone)]
struct Completion {
    live: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    notify: std::sync::Arc<tokio::sync::Notify>,
}

impl Completion {
    fn new() -> Self {
        Self {
            live: Default::default(),
            notify: Default::default(),
        }
    }

    fn enter(&self) {
        self.live.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn exit(&self) {
        self.live.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait_all(&self, limit: Duration) -> bool {
        let all_done = async {
            loop {
                // register interest before checking, so an exit between the
                // load and the await cannot be missed
                let notified = self.notify.notified();
                if self.live.load(std::sync::atomic::Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        timeout(limit, all_done).await.is_ok()
    }
}

/// Spawns critical tasks onto the runtime. A task ending with an error or a
/// panic triggers node shutdown.
#[derive(Clone)]
pub struct TaskExecutor {
    tokio_handle: Handle,
    failed_tasks_tx: mpsc::UnboundedSender<FailedTaskError>,
    shutdown_signal: ShutdownSignal,
    completion: Completion,
}

impl TaskExecutor {
    /// Spawns a future constructed from a [`ShutdownGuard`]. The future is
    /// expected to watch the guard and return `Ok(())` on cooperative
    /// shutdown.
    pub fn spawn_critical<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(ShutdownGuard) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let failed_tasks_tx = self.failed_tasks_tx.clone();
        let fut = task(self.shutdown_signal.guard());
        let completion = self.completion.clone();
        completion.enter();

        info!(%name, "starting critical task");
        self.tokio_handle.spawn(async move {
            let result = AssertUnwindSafe(fut).catch_unwind().await;
            completion.exit();
            let reason = match result {
                Ok(Ok(())) => {
                    debug!(%name, "critical task finished");
                    return;
                }
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic_err) => panic_reason(panic_err),
            };
            error!(%name, %reason, "critical task failed");
            let _ = failed_tasks_tx.send(FailedTaskError::new(name, reason));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_reported() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manager = TaskManager::new(runtime.handle().clone());
        let executor = manager.executor();

        executor.spawn_critical("failing-task", |_| async {
            anyhow::bail!("boom");
        });

        let err = manager
            .monitor(Duration::from_secs(5))
            .expect_err("should report failure");
        assert_eq!(err.task_name(), "failing-task");
    }

    #[test]
    fn test_panic_is_reported() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manager = TaskManager::new(runtime.handle().clone());
        let executor = manager.executor();

        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        executor.spawn_critical("panic-task", |_| async {
            panic!("intentional panic");
        });

        let err = manager
            .monitor(Duration::from_secs(5))
            .expect_err("should report panic");

        panic::set_hook(original_hook);
        assert_eq!(err.task_name(), "panic-task");
    }

    #[test]
    fn test_shutdown_unwinds_tasks() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manager = TaskManager::new(runtime.handle().clone());
        let executor = manager.executor();

        executor.spawn_critical("looping-task", |shutdown| async move {
            shutdown.wait_for_shutdown().await;
            Ok(())
        });

        let shutdown = manager.shutdown_signal();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            shutdown.send();
        });

        manager
            .monitor(Duration::from_secs(5))
            .expect("clean shutdown");
    }
}
