//! Scripted transport for driving the connection manager in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tradedesk_core::error::NetworkError;

use super::{Frame, Link, LinkPeer, Transport};
use crate::ws::message::{Message, MessageCodec};

#[derive(Debug, Default)]
struct MockState {
    fail_next: u32,
    refuse: bool,
    open_delay: Option<Duration>,
    open_times: Vec<Instant>,
    remotes: Vec<MockRemote>,
}

/// Transport double whose opens succeed or fail on command.
///
/// Cloning shares the script, so a test can keep one copy while the
/// connection manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a transport whose opens all succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    /// Makes every open fail until reset.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Delays every open by `delay` before it resolves.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Number of open attempts so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().open_times.len()
    }

    /// When each open attempt started.
    #[must_use]
    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().open_times.clone()
    }

    /// Remote end of the most recent successful open.
    #[must_use]
    pub fn last_remote(&self) -> Option<MockRemote> {
        self.state.lock().remotes.last().cloned()
    }

    /// Remote end of the `index`th successful open.
    #[must_use]
    pub fn remote(&self, index: usize) -> Option<MockRemote> {
        self.state.lock().remotes.get(index).cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open(&self, url: &str) -> Result<Link, NetworkError> {
        let (fail, delay) = {
            let mut state = self.state.lock();
            state.open_times.push(Instant::now());
            let fail = if state.refuse {
                true
            } else if state.fail_next > 0 {
                state.fail_next -= 1;
                true
            } else {
                false
            };
            (fail, state.open_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fail {
            return Err(NetworkError::connection_failed(format!(
                "mock refused {url}"
            )));
        }

        let (link, peer) = Link::pair();
        self.state.lock().remotes.push(MockRemote::new(peer));
        Ok(link)
    }
}

#[derive(Debug)]
struct RemoteInner {
    peer: LinkPeer,
    sent: Vec<Frame>,
}

/// Server side of a mock connection.
#[derive(Debug, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<RemoteInner>>,
}

impl MockRemote {
    fn new(peer: LinkPeer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RemoteInner {
                peer,
                sent: Vec::new(),
            })),
        }
    }

    /// Pushes a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inner.lock().peer.deliver(text)
    }

    /// Pushes an encoded message to the client.
    pub fn push_message(&self, message: &Message) -> bool {
        MessageCodec::new()
            .encode(message)
            .is_ok_and(|text| self.push_text(text))
    }

    /// Closes the connection from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        self.inner.lock().peer.closed(code, reason);
    }

    /// Fails the connection from the server side.
    pub fn fail(&self, cause: &str) {
        self.inner.lock().peer.failed(cause);
    }

    /// Returns true once the client has let go of this connection.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.lock().peer.is_released()
    }

    /// Every frame the client has written so far, in order.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<Frame> {
        let mut inner = self.inner.lock();
        while let Ok(frame) = inner.peer.outbound.try_recv() {
            inner.sent.push(frame);
        }
        inner.sent.clone()
    }

    /// Every text frame the client has written, decoded.
    ///
    /// Frames that do not decode are skipped.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<Message> {
        let codec = MessageCodec::new();
        self.sent_frames()
            .iter()
            .filter_map(Frame::as_text)
            .filter_map(|text| codec.decode(text).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::LinkEvent;

    #[tokio::test]
    async fn test_scripted_failures() {
        let transport = MockTransport::new();
        transport.fail_next_opens(1);

        assert!(transport.open("ws://mock").await.is_err());
        assert!(transport.open("ws://mock").await.is_ok());
        assert_eq!(transport.open_count(), 2);
        assert!(transport.remote(0).is_some());
        assert!(transport.remote(1).is_none());

        transport.set_refuse(true);
        assert!(transport.open("ws://mock").await.is_err());
    }

    #[tokio::test]
    async fn test_remote_records_and_pushes() {
        let transport = MockTransport::new();
        let (sender, mut events) = transport.open("ws://mock").await.unwrap().into_parts();
        let remote = transport.last_remote().unwrap();

        sender.send(Frame::Text("a".into())).unwrap();
        sender.send(Frame::Text("b".into())).unwrap();
        assert_eq!(remote.sent_frames().len(), 2);
        assert_eq!(remote.sent_frames().len(), 2);

        assert!(remote.push_message(&Message::pong()));
        match events.recv().await {
            Some(LinkEvent::Frame(text)) => assert!(text.contains("pong")),
            other => panic!("unexpected event: {other:?}"),
        }

        drop(events);
        assert!(remote.is_released());
    }
}
