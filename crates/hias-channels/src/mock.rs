//! In-memory messaging channel for deterministic testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::adapter::*;
use hias_core::{HiasError, Result};

/// A channel that records calls instead of talking to a broker.
///
/// Inbound traffic can be injected with [`MockChannel::inject`] once connected.
pub struct MockChannel {
    journal: Arc<Mutex<Vec<String>>>,
    /// Every payload published, in order.
    pub published: Arc<Mutex<Vec<(AgentTopic, serde_json::Value)>>>,
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_connect: bool,
    event_tx: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    event_rx: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(vec![])),
            published: Arc::new(Mutex::new(vec![])),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            fail_connect: false,
            event_tx: Mutex::new(None),
            event_rx: Mutex::new(None),
        }
    }

    /// Record into an existing journal instead of a private one.
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = journal;
        self
    }

    /// Make `connect` fail as if the broker were unreachable.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Number of `connect` calls that opened a session.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls that closed a session.
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// The channel calls recorded so far, ignoring other entries in a shared journal.
    pub fn calls(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter(|c| c.starts_with("channel."))
            .cloned()
            .collect()
    }

    /// Deliver an inbound message as if the broker had sent it.
    pub async fn inject(&self, topic: AgentTopic, payload: serde_json::Value) -> Result<()> {
        let tx = self.event_tx.lock().clone();
        let tx = tx.ok_or_else(|| HiasError::ChannelNotConnected("mock".into()))?;
        let message = InboundMessage {
            topic: topic.to_string(),
            agent_topic: Some(topic),
            payload: serde_json::to_vec(&payload)?,
        };
        tx.send(ChannelEvent::Message(message))
            .await
            .map_err(|e| HiasError::channel("mock", e))
    }

    fn record(&self, call: &str) {
        self.journal.lock().push(format!("channel.{call}"));
    }
}

#[async_trait]
impl MessagingChannel for MockChannel {
    fn id(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<()> {
        self.record("connect");
        if self.fail_connect {
            return Err(HiasError::channel("mock", "connection refused"));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(32);
        *self.event_tx.lock() = Some(tx);
        *self.event_rx.lock() = Some(rx);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect");
        if self.connected.swap(false, Ordering::SeqCst) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.event_tx.lock().take();
        }
        Ok(())
    }

    async fn publish(&self, topic: AgentTopic, payload: &serde_json::Value) -> Result<()> {
        if !self.is_connected() {
            return Err(HiasError::ChannelNotConnected("mock".into()));
        }
        self.published
            .lock()
            .push((topic, payload.clone()));
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.lock().take()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let channel = MockChannel::new();
        channel.connect().await.unwrap();
        channel.connect().await.unwrap();
        assert_eq!(channel.connect_count(), 1);
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_never_connected() {
        let channel = MockChannel::new();
        channel.disconnect().await.unwrap();
        assert_eq!(channel.disconnect_count(), 0);
        assert_eq!(channel.calls(), vec!["channel.disconnect"]);
    }

    #[tokio::test]
    async fn test_inject_reaches_receiver() {
        let channel = MockChannel::new();
        channel.connect().await.unwrap();
        let mut rx = channel.take_events().unwrap();
        channel
            .inject(AgentTopic::Commands, serde_json::json!({"command": "status"}))
            .await
            .unwrap();
        match rx.recv().await {
            Some(ChannelEvent::Message(m)) => assert_eq!(m.agent_topic, Some(AgentTopic::Commands)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
