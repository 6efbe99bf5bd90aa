//! In-memory transport for tests.

use crate::error::{ClientError, Result};
use crate::transport::{HttpRequest, Method, RawResponse, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Mock transport with routed, canned responses.
///
/// Routes are keyed by method and the request URL's path plus query
/// (e.g. `/api/v1/forms/?page=2`). Several responses queued on the same
/// route are served in order; the last one repeats once the queue drains.
/// Every request is recorded for later assertions.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

#[derive(Clone)]
enum Reply {
    Response(RawResponse),
    Fail(String),
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response for a route
    pub fn on(self, method: Method, path: &str, status: u16, body: Value) -> Self {
        self.push(method, path, Reply::Response(RawResponse::json(status, &body)));
        self
    }

    /// Queue a raw (possibly non-JSON) response for a route
    pub fn on_raw(self, method: Method, path: &str, status: u16, body: &str) -> Self {
        self.push(method, path, Reply::Response(RawResponse::new(status, body)));
        self
    }

    /// Make a route fail at the transport level
    pub fn fail(self, method: Method, path: &str, message: &str) -> Self {
        self.push(method, path, Reply::Fail(message.to_string()));
        self
    }

    /// Add a route on an existing (shared) mock
    pub fn add(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Response(RawResponse::json(status, &body)));
    }

    /// All requests sent so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests sent for a method/path pair
    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && route_key(&r.url) == path)
            .count()
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.entry((method, path.to_string())).or_default().push_back(reply);
        }
    }
}

fn route_key(url: &url::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        let key = (request.method, route_key(&request.url));
        let url = request.url.to_string();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let reply = {
            let mut routes = self
                .routes
                .lock()
                .map_err(|_| ClientError::transport(&url, "mock poisoned"))?;
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(ClientError::transport(url, message)),
            None => Ok(RawResponse::json(404, &serde_json::json!({"detail": "Not found."}))),
        }
    }
}
