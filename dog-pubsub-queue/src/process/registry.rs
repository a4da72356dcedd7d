use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{ProcessId, QueueError, QueueResult};

/// Handle for a running consumer loop
pub struct ListenerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl ListenerHandle {
    pub(crate) fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<()>) -> Self {
        Self {
            shutdown_tx,
            join_handle,
        }
    }

    /// Detach from the subscription and wait for the consumer loop to exit.
    /// Jobs already handed to the callback keep running and still settle.
    pub async fn shutdown(self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("Listener join error: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

type RegistryKey = (String, ProcessId);

/// Active listeners keyed by `(queue name, callback identity)`
#[derive(Default)]
pub struct ProcessRegistry {
    listeners: Mutex<HashMap<RegistryKey, ListenerHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a listener exists for exactly this pair
    pub fn has(&self, queue_name: &str, process: ProcessId) -> bool {
        self.listeners
            .lock()
            .contains_key(&(queue_name.to_string(), process))
    }

    /// Record a listener, replacing any previous one for the same pair.
    /// A replaced listener loses its shutdown sender and stops on its own.
    pub fn set(&self, queue_name: &str, process: ProcessId, listener: ListenerHandle) {
        self.listeners
            .lock()
            .insert((queue_name.to_string(), process), listener);
    }

    /// Remove and return the listener for this pair
    pub fn get_and_delete(&self, queue_name: &str, process: ProcessId) -> Option<ListenerHandle> {
        self.listeners
            .lock()
            .remove(&(queue_name.to_string(), process))
    }

    /// Check and insert under one lock. `create` runs only when the pair is
    /// absent; returns whether a listener was registered.
    pub fn register_if_absent<F>(&self, queue_name: &str, process: ProcessId, create: F) -> QueueResult<bool>
    where
        F: FnOnce() -> QueueResult<ListenerHandle>,
    {
        let mut listeners = self.listeners.lock();
        let key = (queue_name.to_string(), process);
        if listeners.contains_key(&key) {
            return Ok(false);
        }
        let listener = create()?;
        listeners.insert(key, listener);
        Ok(true)
    }

    /// Remove every listener
    pub fn drain(&self) -> Vec<(String, ListenerHandle)> {
        self.listeners
            .lock()
            .drain()
            .map(|((queue_name, _), listener)| (queue_name, listener))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Listeners registered for one queue
    pub fn count_for(&self, queue_name: &str) -> usize {
        self.listeners
            .lock()
            .keys()
            .filter(|(queue, _)| queue == queue_name)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_listener() -> (ListenerHandle, oneshot::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            let _ = shutdown_rx.await;
            let _ = done_tx.send(());
        });
        (ListenerHandle::new(shutdown_tx, join_handle), done_rx)
    }

    #[tokio::test]
    async fn test_set_has_get_and_delete() {
        let registry = ProcessRegistry::new();
        let process = ProcessId::next();
        let (listener, _) = idle_listener();

        assert!(!registry.has("q1", process));
        registry.set("q1", process, listener);
        assert!(registry.has("q1", process));
        assert!(!registry.has("q2", process));

        let listener = registry.get_and_delete("q1", process).unwrap();
        assert!(!registry.has("q1", process));
        assert!(registry.get_and_delete("q1", process).is_none());

        listener.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_if_absent_runs_create_once() {
        let registry = ProcessRegistry::new();
        let process = ProcessId::next();

        let created = registry
            .register_if_absent("q1", process, || Ok(idle_listener().0))
            .unwrap();
        assert!(created);

        let created = registry
            .register_if_absent("q1", process, || panic!("must not create twice"))
            .unwrap();
        assert!(!created);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_registers_nothing() {
        let registry = ProcessRegistry::new();
        let result = registry.register_if_absent("q1", ProcessId::next(), || {
            Err(QueueError::NoSubscriptionConfigured("q1".into()))
        });

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_same_queue_different_processes() {
        let registry = ProcessRegistry::new();
        let a = ProcessId::next();
        let b = ProcessId::next();
        registry.set("q1", a, idle_listener().0);
        registry.set("q1", b, idle_listener().0);
        registry.set("q2", a, idle_listener().0);

        assert_eq!(registry.count_for("q1"), 2);
        drop(registry.get_and_delete("q1", a));
        assert!(registry.has("q1", b));
        assert!(registry.has("q2", a));
    }

    #[tokio::test]
    async fn test_overwritten_listener_stops() {
        let registry = ProcessRegistry::new();
        let process = ProcessId::next();
        let (first, first_done) = idle_listener();
        registry.set("q1", process, first);
        registry.set("q1", process, idle_listener().0);

        tokio::time::timeout(std::time::Duration::from_secs(1), first_done)
            .await
            .expect("replaced listener should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = ProcessRegistry::new();
        registry.set("q1", ProcessId::next(), idle_listener().0);
        registry.set("q2", ProcessId::next(), idle_listener().0);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());

        for (_, listener) in drained {
            listener.shutdown().await.unwrap();
        }
    }
}
