//! Debounced change notifications.
//!
//! Mutations fire events as soon as the remote confirms them. The notifier
//! holds them for a short window and delivers everything fired inside that
//! window as one batch, so a create followed by its first save reaches
//! subscribers together.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::types::ChangeEvent;

/// Default coalescing window. Short enough that a single save's events
/// arrive as one prompt batch; `Config::debounce_ms` widens it.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct Pending {
    events: Vec<ChangeEvent>,
    /// Bumped on every fire; only the last timer of a burst delivers.
    generation: u64,
}

/// Trailing-debounce broadcaster of [`ChangeEvent`] batches.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<Vec<ChangeEvent>>,
    window: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl ChangeNotifier {
    pub fn new(window: Duration) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Receive batches fired after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<ChangeEvent>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Queue events and (re)start the window.
    ///
    /// Outside a tokio runtime there is no timer to wait on, so the batch is
    /// delivered immediately.
    pub fn fire(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        let generation = {
            let mut pending = self.pending.lock();
            pending.events.extend(events);
            pending.generation += 1;
            pending.generation
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.flush();
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(notifier.window).await;
            notifier.deliver(generation);
        });
    }

    /// Deliver whatever is queued now, without waiting for the window.
    pub fn flush(&self) {
        let events = std::mem::take(&mut self.pending.lock().events);
        self.send(events);
    }

    fn deliver(&self, generation: u64) {
        let events = {
            let mut pending = self.pending.lock();
            if pending.generation != generation {
                return;
            }
            std::mem::take(&mut pending.events)
        };
        self.send(events);
    }

    fn send(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        tracing::trace!(count = events.len(), "change notification");
        // No subscribers is fine.
        let _ = self.tx.send(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemoteUri;

    fn uri(path: &str) -> RemoteUri {
        RemoteUri::new("h", path)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_one_batch() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.fire([ChangeEvent::created(uri("/site/a"))]);
        tokio::time::sleep(Duration::from_millis(2)).await;
        notifier.fire([ChangeEvent::changed(uri("/site/a"))]);

        let batch = rx.recv().await.unwrap();
        assert_eq!(
            batch,
            vec![
                ChangeEvent::created(uri("/site/a")),
                ChangeEvent::changed(uri("/site/a")),
            ]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_are_separate_batches() {
        let notifier = ChangeNotifier::new(Duration::from_millis(5));
        let mut rx = notifier.subscribe();

        notifier.fire([ChangeEvent::created(uri("/site/a"))]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        notifier.fire([ChangeEvent::deleted(uri("/site/b"))]);

        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            vec![ChangeEvent::deleted(uri("/site/b"))]
        );
    }

    #[test]
    fn test_fire_without_runtime_delivers_immediately() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();
        notifier.fire([ChangeEvent::changed(uri("/site/a"))]);
        assert_eq!(rx.try_recv().unwrap().len(), 1);
    }
}
