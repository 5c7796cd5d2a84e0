//! Testing harness for connector implementations.
//!
//! [`MockTransport`] replays scripted responses keyed by method and path and
//! records every request it sees, so tests can assert on call order and
//! counts without a network.

use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::traits::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use reqwest::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum MockReply {
    Response(HttpResponse),
    Error(ConnectorError),
}

type RouteKey = (Method, String);

/// Scripted transport for tests.
///
/// Each route holds a queue of replies. Replies are consumed in order and
/// the last one repeats, so a single `push` serves any number of calls.
#[derive(Default)]
pub struct MockTransport {
    routes: RwLock<HashMap<RouteKey, VecDeque<MockReply>>>,
    calls: RwLock<Vec<HttpRequest>>,
    call_count: AtomicU64,
}

impl MockTransport {
    /// Creates an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `method path`.
    pub async fn push(&self, method: Method, path: &str, status: u16, body: impl Into<String>) {
        self.push_reply(method, path, MockReply::Response(HttpResponse::new(status, body)))
            .await;
    }

    /// Queues the same response `times` times.
    pub async fn push_n(
        &self,
        method: Method,
        path: &str,
        times: usize,
        status: u16,
        body: &str,
    ) {
        for _ in 0..times {
            self.push(method.clone(), path, status, body).await;
        }
    }

    /// Queues a transport failure for `method path`.
    pub async fn push_error(&self, method: Method, path: &str, error: ConnectorError) {
        self.push_reply(method, path, MockReply::Error(error)).await;
    }

    async fn push_reply(&self, method: Method, path: &str, reply: MockReply) {
        let mut routes = self.routes.write().await;
        routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Returns every request sent so far, in order.
    pub async fn calls(&self) -> Vec<HttpRequest> {
        self.calls.read().await.clone()
    }

    /// Returns the requests sent to `method path`.
    pub async fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    /// Returns the number of requests sent to `method path`.
    pub async fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).await.len()
    }

    /// Returns the total number of requests sent.
    pub fn total_calls(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let key = (request.method.clone(), request.path.clone());
        self.calls.write().await.push(request);

        let reply = {
            let mut routes = self.routes.write().await;
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Error(error)) => Err(error),
            None => Err(ConnectorError::Transport(format!(
                "no mock response for {} {}",
                key.0, key.1
            ))),
        }
    }
}
