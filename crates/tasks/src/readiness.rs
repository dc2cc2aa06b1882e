use std::collections::HashSet;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::*;

/// Handed to a startable component; consumed exactly once when the component
/// has finished bootstrapping.
pub struct ReadySignal {
    name: &'static str,
    tx: mpsc::UnboundedSender<&'static str>,
}

impl ReadySignal {
    pub fn notify(self) {
        // receiver gone means the tracker already gave up, nothing to do
        let _ = self.tx.send(self.name);
    }
}

/// Aggregates readiness across components and reports how long bootstrap
/// took once the last one checks in.
pub struct Readiness {
    started: Instant,
    pending: HashSet<&'static str>,
    tx: mpsc::UnboundedSender<&'static str>,
    rx: mpsc::UnboundedReceiver<&'static str>,
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            started: Instant::now(),
            pending: HashSet::new(),
            tx,
            rx,
        }
    }

    pub fn register(&mut self, name: &'static str) -> ReadySignal {
        self.pending.insert(name);
        ReadySignal {
            name,
            tx: self.tx.clone(),
        }
    }

    /// Resolves when every registered component has reported, logging each
    /// arrival and the total bootstrap duration.
    pub async fn wait_all(mut self) {
        drop(self.tx);
        while !self.pending.is_empty() {
            match self.rx.recv().await {
                Some(name) => {
                    self.pending.remove(name);
                    debug!(%name, "component ready");
                }
                // a component dropped its signal without notifying; it
                // failed, and the supervisor will tear everything down
                None => return,
            }
        }
        info!(after = ?self.started.elapsed(), "node is ready");
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_waits_for_all() {
        let mut readiness = Readiness::new();
        let a = readiness.register("a");
        let b = readiness.register("b");

        let waiter = tokio::spawn(readiness.wait_all());
        a.notify();
        assert!(!waiter.is_finished());
        b.notify();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_resolves_when_component_drops_out() {
        let mut readiness = Readiness::new();
        let a = readiness.register("a");
        let b = readiness.register("b");
        a.notify();
        drop(b);
        readiness.wait_all().await;
    }
}
