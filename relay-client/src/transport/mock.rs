//! Mock transport for testing.
//!
//! Allows queueing responses, capturing sent requests for verification and
//! driving subscriptions by hand.

use super::{EventStream, Method, Request, Response, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use relay_content::bytes_stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A scripted response.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    /// Status to return.
    pub status: u16,
    /// Base64 record header to return.
    pub record: Option<String>,
    /// Body to return.
    pub body: Vec<u8>,
}

impl MockResponse {
    /// A bodiless response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// A response carrying a record header and body.
    pub fn with_record(status: u16, record: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            record: Some(record.into()),
            body: body.into(),
        }
    }
}

/// A request as the mock saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    /// Method.
    pub method: Method,
    /// URL.
    pub url: String,
    /// Record header, if any.
    pub record: Option<String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// Mock transport for testing.
///
/// Requests are answered from a queue of [`MockResponse`]s. When the queue
/// is empty, GETs answer 404 and PUTs answer 200.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    requests: Vec<CapturedRequest>,
    responses: VecDeque<MockResponse>,
    fail_requests: usize,
    offline: bool,
    subscriptions: Vec<(String, Option<String>)>,
    subscribers: Vec<(String, mpsc::UnboundedSender<Result<String, TransportError>>)>,
    fail_next_subscribe: Option<String>,
    gate: Option<(watch::Sender<bool>, watch::Receiver<bool>)>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Capture `request` and pick its response under the lock.
    fn take_response(
        &self,
        request: Request,
    ) -> Result<(MockResponse, Option<watch::Receiver<bool>>), TransportError> {
        let mut inner = self.lock();

        inner.requests.push(CapturedRequest {
            method: request.method,
            url: request.url,
            record: request.record,
            body: request.body.to_vec(),
        });

        // Check for forced failure
        if inner.offline {
            return Err(TransportError::ConnectionFailed("offline".into()));
        }
        if inner.fail_requests > 0 {
            inner.fail_requests -= 1;
            return Err(TransportError::ConnectionFailed("injected failure".into()));
        }

        let scripted = inner.responses.pop_front().unwrap_or_else(|| match request.method {
            Method::Get => MockResponse::status(404),
            Method::Put => MockResponse::status(200),
        });
        let gate = inner.gate.as_ref().map(|(_, rx)| rx.clone());
        Ok((scripted, gate))
    }

    /// Queue a response for the next request.
    pub fn queue_response(&self, response: MockResponse) {
        self.lock().responses.push_back(response);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.lock().requests.clone()
    }

    /// Requests received so far with the given method.
    pub fn requests_with(&self, method: Method) -> Vec<CapturedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Get the last request that was sent.
    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.lock().requests.last().cloned()
    }

    /// Cause the next `count` requests to fail at the network level.
    pub fn fail_next_requests(&self, count: usize) {
        self.lock().fail_requests = count;
    }

    /// Fail every request (and subscription) until set back to `false`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Cause the next subscribe() to fail with the given error.
    pub fn fail_next_subscribe(&self, error: &str) {
        self.lock().fail_next_subscribe = Some(error.to_string());
    }

    /// Park every request after it has taken its scripted response, until
    /// [`release_requests`](Self::release_requests).
    ///
    /// Responses are still handed out in request order, so a test can let
    /// work race an in-flight fetch.
    pub fn hold_requests(&self) {
        let mut inner = self.lock();
        match &inner.gate {
            Some((tx, _)) => {
                tx.send_replace(true);
            }
            None => inner.gate = Some(watch::channel(true)),
        }
    }

    /// Let held requests (and any later ones) complete.
    pub fn release_requests(&self) {
        if let Some((tx, _)) = &self.lock().gate {
            tx.send_replace(false);
        }
    }

    /// Every subscribe call made, with the record presented.
    pub fn subscriptions(&self) -> Vec<(String, Option<String>)> {
        self.lock().subscriptions.clone()
    }

    /// Number of subscription streams still held open by the client.
    pub fn open_subscriptions(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|(_, tx)| !tx.is_closed());
        inner.subscribers.len()
    }

    /// Push an event to every open subscription at `url`.
    pub fn push_event(&self, url: &str, data: &str) {
        let mut inner = self.lock();
        inner.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (_, tx) in inner.subscribers.iter().filter(|(u, _)| u == url) {
            let _ = tx.send(Ok(data.to_string()));
        }
    }

    /// End every open subscription stream, as if the relay went away.
    pub fn drop_subscriptions(&self) {
        self.lock().subscribers.clear();
    }

    /// Clear all state (requests, queue, subscriptions, failures).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: Request) -> Result<Response, TransportError> {
        let (scripted, gate) = self.take_response(request)?;
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|held| !*held).await;
        }

        Ok(Response {
            status: scripted.status,
            record: scripted.record,
            body: bytes_stream(Bytes::from(scripted.body)),
        })
    }

    async fn subscribe(
        &self,
        url: &str,
        record: Option<String>,
    ) -> Result<EventStream, TransportError> {
        let mut inner = self.lock();
        inner.subscriptions.push((url.to_string(), record));

        if inner.offline {
            return Err(TransportError::ConnectionFailed("offline".into()));
        }
        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push((url.to_string(), tx));
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
