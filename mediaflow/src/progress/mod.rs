//! Stage-granularity progress notifications.
//!
//! Schedulers report `0.0` when a stage starts and `1.0` when it completes.
//! Observers run on the blocking pool, one event at a time in the order
//! events were reported, so a slow observer never holds up a scheduler.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Observer invoked as `callback(stage_name, progress)`.
pub type ProgressCallback = Arc<dyn Fn(&str, f64) + Send + Sync>;

enum Dispatch {
    Event {
        stage: String,
        value: f64,
        callbacks: Vec<ProgressCallback>,
    },
    Flush(oneshot::Sender<()>),
}

/// Fans progress updates out to registered observers.
#[derive(Default)]
pub struct ProgressNotifier {
    callbacks: RwLock<Vec<ProgressCallback>>,
    progress: RwLock<HashMap<String, f64>>,
    dispatcher: Mutex<Option<mpsc::UnboundedSender<Dispatch>>>,
}

impl ProgressNotifier {
    /// Creates a notifier with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier that logs every update.
    #[must_use]
    pub fn with_logging() -> Self {
        let notifier = Self::new();
        notifier.register(|stage, value| {
            info!(stage = %stage, progress = value, "Stage progress");
        });
        notifier
    }

    /// Adds an observer.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Records `value` for `stage` and notifies every observer.
    ///
    /// Returns immediately; observers run in the background. Outside a
    /// Tokio runtime the observers are invoked inline.
    pub fn update(&self, stage: &str, value: f64) {
        self.progress.write().insert(stage.to_string(), value);

        let callbacks = self.callbacks.read().clone();
        if callbacks.is_empty() {
            return;
        }

        let Some(sender) = self.sender() else {
            for callback in &callbacks {
                callback(stage, value);
            }
            return;
        };

        let event = Dispatch::Event {
            stage: stage.to_string(),
            value,
            callbacks,
        };
        if sender.send(event).is_err() {
            warn!(stage = %stage, "Progress dispatcher stopped; update dropped");
        }
    }

    /// Returns the last reported value per stage.
    #[must_use]
    pub fn progress(&self) -> HashMap<String, f64> {
        self.progress.read().clone()
    }

    /// Waits until every update reported so far has been delivered.
    pub async fn flush(&self) {
        let Some(sender) = self.dispatcher.lock().clone() else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if sender.send(Dispatch::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Dispatch>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let mut slot = self.dispatcher.lock();
        if let Some(sender) = slot.as_ref().filter(|s| !s.is_closed()) {
            return Some(sender.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(dispatch_loop(rx));
        *slot = Some(tx.clone());
        Some(tx)
    }
}

async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Event {
                stage,
                value,
                callbacks,
            } => {
                let result = tokio::task::spawn_blocking(move || {
                    for callback in &callbacks {
                        callback(&stage, value);
                    }
                })
                .await;
                if let Err(err) = result {
                    warn!(error = %err, "Progress observer panicked");
                }
            }
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressNotifier")
            .field("observers", &self.observer_count())
            .field("progress", &*self.progress.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_observers_receive_updates_in_order() {
        let notifier = ProgressNotifier::new();
        let seen: Arc<Mutex<Vec<(String, f64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        notifier.register(move |stage, value| sink.lock().push((stage.to_string(), value)));

        notifier.update("a", 0.0);
        notifier.update("a", 1.0);
        notifier.update("b", 0.0);
        notifier.flush().await;

        assert_eq!(
            *seen.lock(),
            vec![
                ("a".to_string(), 0.0),
                ("a".to_string(), 1.0),
                ("b".to_string(), 0.0)
            ]
        );
        assert_eq!(notifier.progress().get("a"), Some(&1.0));
        assert_eq!(notifier.progress().get("b"), Some(&0.0));
    }

    #[tokio::test]
    async fn test_every_observer_is_called() {
        let notifier = ProgressNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            notifier.register(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        notifier.update("stage", 1.0);
        notifier.flush().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_observer_does_not_block_update() {
        let notifier = ProgressNotifier::new();
        notifier.register(|_, _| std::thread::sleep(Duration::from_millis(200)));

        let start = Instant::now();
        notifier.update("slow", 0.0);
        assert!(start.elapsed() < Duration::from_millis(100));
        notifier.flush().await;
    }

    #[test]
    fn test_update_without_runtime_runs_inline() {
        let notifier = ProgressNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        notifier.register(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.update("inline", 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_observers() {
        let notifier = ProgressNotifier::with_logging();
        assert_eq!(notifier.observer_count(), 1);
        ProgressNotifier::new().update("x", 0.0);
        notifier.flush().await;
    }
}
