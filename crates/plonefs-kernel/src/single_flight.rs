//! Single-flight guard for loads.
//!
//! At most one load per guard runs at a time. Callers arriving while a load
//! is in flight await that same load and observe its outcome, success or
//! failure, instead of starting another request. Once the load settles the
//! guard is empty again, so a later call starts a fresh load.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::future::Future;

use crate::error::FsResult;

type SharedLoad<T> = Shared<BoxFuture<'static, FsResult<T>>>;

/// Collapses concurrent loads of one resource into one underlying call.
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    inflight: Mutex<Option<(u64, SharedLoad<T>)>>,
    next_id: Mutex<u64>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }

    /// Returns true while a load is running.
    pub fn is_in_flight(&self) -> bool {
        self.inflight.lock().is_some()
    }

    /// Run `start()` unless a load is already in flight; either way, await
    /// the in-flight load's result.
    pub async fn run<F, Fut>(&self, start: F) -> FsResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FsResult<T>> + Send + 'static,
    {
        let (id, load) = {
            let mut inflight = self.inflight.lock();
            match inflight.as_ref() {
                Some((id, load)) => (*id, load.clone()),
                None => {
                    let id = {
                        let mut next = self.next_id.lock();
                        *next += 1;
                        *next
                    };
                    let load = start().boxed().shared();
                    *inflight = Some((id, load.clone()));
                    (id, load)
                }
            }
        };

        let result = load.await;

        let mut inflight = self.inflight.lock();
        if inflight.as_ref().is_some_and(|(current, _)| *current == id) {
            *inflight = None;
        }
        result
    }
}
