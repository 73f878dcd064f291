//! Tracks the long-running tasks of the agent and awaits them on shutdown.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawns named tasks and keeps their handles so shutdown can wait for them.
///
/// Every task is expected to watch the shutdown receiver handed out by
/// [`TaskManager::get_shutdown_rx`] and return once it fires.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns `future` and records its handle under `name`.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        match self.handles.lock() {
            Ok(mut handles) => handles.push((name, handle)),
            Err(e) => error!(task_name = name, error = %e, "Task registry poisoned, task is untracked"),
        }
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        let handles: Vec<_> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(e) => {
                error!(error = %e, "Task registry poisoned, not waiting for tasks");
                return;
            }
        };
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (names, handles): (Vec<&'static str>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = 0;
        for (task_name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked += 1;
                }
            }
        }

        if panicked > 0 {
            error!("{} tasks panicked during shutdown", panicked);
        } else {
            info!("All tasks shut down gracefully.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks_watching_the_signal() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = TaskManager::new(shutdown_rx);
        let finished = Arc::new(AtomicUsize::new(0));

        for name in ["first", "second"] {
            let mut rx = manager.get_shutdown_rx();
            let finished = finished.clone();
            manager.spawn(name, async move {
                let _ = rx.changed().await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        shutdown_tx.send(true).unwrap();
        manager.shutdown().await;

        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}
