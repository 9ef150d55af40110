//! Scripted transport for tests.
//!
//! Routes are keyed `"METHOD /path"` or `"METHOD /path?query"`; a request
//! matches its exact path-and-query first, then its bare path. Unrouted
//! requests get a 404.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{FsError, FsResult};
use crate::session::{HttpRequest, HttpResponse, Transport};

enum Route {
    Fixed(HttpResponse),
    Sequence(Vec<HttpResponse>),
    Fail(FsError),
}

/// Transport that answers from a route table and records every request.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `key` with `response`.
    pub fn respond(&self, key: &str, response: HttpResponse) {
        self.routes
            .lock()
            .insert(key.to_string(), Route::Fixed(response));
    }

    /// Answer `key` with each response in turn; the last one repeats.
    pub fn respond_seq(&self, key: &str, responses: Vec<HttpResponse>) {
        self.routes
            .lock()
            .insert(key.to_string(), Route::Sequence(responses));
    }

    /// Fail `key` at the transport level.
    pub fn fail(&self, key: &str, error: FsError) {
        self.routes.lock().insert(key.to_string(), Route::Fail(error));
    }

    /// Hold every response for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests matching `key` (exact path-and-query or bare path).
    pub fn requests_for(&self, key: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| {
                key == format!("{} {}", r.method, r.path_and_query)
                    || key == format!("{} {}", r.method, r.path())
            })
            .cloned()
            .collect()
    }

    /// Number of requests matching `key`.
    pub fn count(&self, key: &str) -> usize {
        self.requests_for(key).len()
    }

    /// Total number of requests.
    pub fn total(&self) -> usize {
        self.requests.lock().len()
    }

    fn answer(&self, request: &HttpRequest) -> FsResult<HttpResponse> {
        let exact = format!("{} {}", request.method, request.path_and_query);
        let bare = format!("{} {}", request.method, request.path());
        let mut routes = self.routes.lock();
        let key = if routes.contains_key(&exact) { exact } else { bare };
        match routes.get_mut(&key) {
            Some(Route::Fixed(response)) => Ok(response.clone()),
            Some(Route::Sequence(responses)) => {
                if responses.len() > 1 {
                    Ok(responses.remove(0))
                } else {
                    Ok(responses.first().cloned().unwrap_or_default())
                }
            }
            Some(Route::Fail(error)) => Err(error.clone()),
            None => Ok(HttpResponse::new(404)),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> FsResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(&request)
    }
}
