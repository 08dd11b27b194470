//! Scripted in-memory sessions for exercising controllers without a socket.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deploy_proto::{encode, InboundEvent};
use parking_lot::Mutex;

use crate::dispatch::Shared;
use crate::{ConnectionState, Connector, Endpoint, Listener, SessionLink, TransportError};

/// Hands out [`MockLink`]s and remembers every one it opened.
#[derive(Default)]
pub struct MockConnector {
    failures: Mutex<VecDeque<String>>,
    links: Mutex<Vec<Arc<MockLink>>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail with a connection error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.failures.lock().push_back(reason.into());
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn links(&self) -> Vec<Arc<MockLink>> {
        self.links.lock().clone()
    }

    pub fn last_link(&self) -> Option<Arc<MockLink>> {
        self.links.lock().last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Arc<dyn SessionLink>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failures.lock().pop_front() {
            return Err(TransportError::Connection(reason));
        }
        let link = Arc::new(MockLink::open(endpoint));
        self.links.lock().push(link.clone());
        Ok(link)
    }
}

/// An open session whose peer is the test.
pub struct MockLink {
    endpoint: Endpoint,
    shared: Shared,
    written: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
}

impl MockLink {
    pub fn open(endpoint: &Endpoint) -> Self {
        Self {
            endpoint: endpoint.clone(),
            shared: Shared::open(),
            written: Mutex::new(vec![endpoint.handshake.init.clone()]),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Frames written by the caller through `send`, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Everything that reached the wire, handshake and goodbye frames included.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Delivers a raw text frame as if the peer had sent it.
    pub fn push_text(&self, text: impl Into<String>) {
        self.shared.frame(text.into());
    }

    pub fn push(&self, event: &InboundEvent) {
        match encode(event) {
            Ok(text) => self.push_text(text),
            Err(err) => panic!("inbound event must encode: {err}"),
        }
    }

    /// Simulates the peer or the network ending the session.
    pub fn drop_connection(&self, to: ConnectionState) -> bool {
        self.shared.end(to)
    }
}

#[async_trait]
impl SessionLink for MockLink {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.shared.state().is_open() {
            return Err(TransportError::NotConnected);
        }
        self.written.lock().push(text.clone());
        self.sent.lock().push(text);
        Ok(())
    }

    fn on_message(&self, listener: Listener) {
        self.shared.replace_listener(listener);
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.shared.end(ConnectionState::Closed) {
            return;
        }
        if let Some(frame) = &self.endpoint.handshake.close {
            self.written.lock().push(frame.clone());
        }
    }
}
