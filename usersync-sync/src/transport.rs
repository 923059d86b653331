//! Transport boundary consumed by executors.
//!
//! The repo never talks to the network itself. Executors translate
//! operations into requests and hand them to a [`Transport`], which reports
//! success, a retryable failure or a terminal failure. Timeouts are the
//! transport's concern.

use async_trait::async_trait;
use std::fmt;

/// HTTP-style request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
}

impl Endpoint {
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
        }
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path)
    }
}

/// Result of sending one request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    Success(serde_json::Value),
    /// Network errors, timeouts, 5xx-class responses.
    RetryableFailure(String),
    /// Validation errors, 4xx-class responses.
    TerminalFailure(String),
}

/// Sends requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &Endpoint, payload: serde_json::Value) -> TransportOutcome;
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// A request seen by [`MockTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub endpoint: Endpoint,
        pub payload: serde_json::Value,
    }

    /// Records every request and answers with scripted outcomes.
    ///
    /// Scripted outcomes are matched by path fragment and consumed in
    /// order; unmatched requests succeed with an empty object.
    #[derive(Default)]
    pub struct MockTransport {
        requests: Mutex<Vec<RecordedRequest>>,
        scripted: Mutex<Vec<(String, TransportOutcome)>>,
        delays: Mutex<HashMap<String, Duration>>,
        paused: AtomicBool,
        resume: Notify,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues an outcome for the next request whose path contains
        /// `fragment`.
        pub fn push_outcome(&self, fragment: impl Into<String>, outcome: TransportOutcome) {
            lock(&self.scripted).push((fragment.into(), outcome));
        }

        /// Delays every request whose path contains `fragment`.
        pub fn set_delay(&self, fragment: impl Into<String>, delay: Duration) {
            lock(&self.delays).insert(fragment.into(), delay);
        }

        /// Holds every request (after recording it) until [`resume`](Self::resume).
        pub fn pause(&self) {
            self.paused.store(true, Ordering::SeqCst);
        }

        pub fn resume(&self) {
            self.paused.store(false, Ordering::SeqCst);
            self.resume.notify_waiters();
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            lock(&self.requests).clone()
        }

        /// Requests whose path contains `fragment`, in send order.
        pub fn requests_to(&self, fragment: &str) -> Vec<RecordedRequest> {
            lock(&self.requests)
                .iter()
                .filter(|r| r.endpoint.path.contains(fragment))
                .cloned()
                .collect()
        }

        fn next_outcome(&self, path: &str) -> TransportOutcome {
            let mut scripted = lock(&self.scripted);
            match scripted.iter().position(|(fragment, _)| path.contains(fragment.as_str())) {
                Some(index) => scripted.remove(index).1,
                None => TransportOutcome::Success(serde_json::json!({})),
            }
        }

        fn delay_for(&self, path: &str) -> Option<Duration> {
            lock(&self.delays)
                .iter()
                .find(|(fragment, _)| path.contains(fragment.as_str()))
                .map(|(_, delay)| *delay)
        }

        async fn wait_while_paused(&self) {
            loop {
                let notified = self.resume.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.paused.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, endpoint: &Endpoint, payload: serde_json::Value) -> TransportOutcome {
            lock(&self.requests).push(RecordedRequest {
                endpoint: endpoint.clone(),
                payload,
            });
            self.wait_while_paused().await;
            if let Some(delay) = self.delay_for(&endpoint.path) {
                tokio::time::sleep(delay).await;
            }
            self.next_outcome(&endpoint.path)
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
