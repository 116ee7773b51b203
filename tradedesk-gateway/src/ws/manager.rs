//! Connection lifecycle: open, keep alive, recover, route.
//!
//! A [`ConnectionManager`] is a cheap, cloneable handle. All lifecycle work
//! happens in one background task (the driver) that owns the transport, the
//! heartbeat timer and the reconnect timer, so state transitions are totally
//! ordered. Handles read shared state and submit outbound messages.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::future::pending;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};
use tradedesk_core::error::NetworkError;

use super::config::ConnectionConfig;
use super::heartbeat::HeartbeatMonitor;
use super::message::{Message, MessageCodec};
use super::reconnect::ReconnectPolicy;
use super::router::{MessageRouter, SubscriptionId};
use super::state::{ConnectionState, ConnectionStats, HeartbeatStatus, InternalState};
use super::transport::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, Frame, Link, LinkEvent, LinkEvents, Transport,
};

/// Receives lifecycle events from a [`ConnectionManager`].
///
/// Callbacks run synchronously on the manager's event loop at the point of
/// the corresponding transition, so they must not block.
pub trait ConnectionObserver: Send + Sync {
    /// Called when a connection is established.
    fn on_connected(&self) {}

    /// Called when the connection closes, manually or otherwise.
    fn on_disconnected(&self, _code: u16, _reason: &str) {}

    /// Called when an open attempt or the live link fails, and when
    /// reconnect attempts run out.
    fn on_error(&self, _error: &NetworkError) {}

    /// Called on every state change.
    fn on_state_change(&self, _state: ConnectionState) {}

    /// Called when a reconnect attempt is scheduled.
    fn on_reconnecting(&self, _attempt: u32, _max_attempts: u32) {}
}

#[derive(Debug)]
enum LifecycleEvent {
    StateChanged(ConnectionState),
    Connected,
    Disconnected { code: u16, reason: String },
    Error(NetworkError),
    Reconnecting { attempt: u32, max_attempts: u32 },
}

impl LifecycleEvent {
    fn deliver(&self, observer: &dyn ConnectionObserver) {
        match self {
            Self::StateChanged(state) => observer.on_state_change(*state),
            Self::Connected => observer.on_connected(),
            Self::Disconnected { code, reason } => observer.on_disconnected(*code, reason),
            Self::Error(error) => observer.on_error(error),
            Self::Reconnecting {
                attempt,
                max_attempts,
            } => observer.on_reconnecting(*attempt, *max_attempts),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

struct Shared {
    config: ConnectionConfig,
    codec: MessageCodec,
    inner: RwLock<InternalState>,
    router: Arc<MessageRouter>,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn emit(&self, events: Vec<LifecycleEvent>) {
        if events.is_empty() {
            return;
        }
        let observers = self.observers.read().clone();
        for event in &events {
            if let LifecycleEvent::StateChanged(state) = event {
                self.state_tx.send_replace(*state);
            }
            for observer in &observers {
                if catch_unwind(AssertUnwindSafe(|| event.deliver(observer.as_ref()))).is_err() {
                    error!(event = ?event, "Connection observer panicked");
                }
            }
        }
    }

    /// Moves to `next`, queueing a state event only if the state changed.
    fn transition(&self, next: ConnectionState, events: &mut Vec<LifecycleEvent>) {
        if self.inner.write().transition(next) {
            debug!(state = %next, "Connection state changed");
            events.push(LifecycleEvent::StateChanged(next));
        }
    }
}

/// Handle to a managed real-time connection.
///
/// Create one at startup and hand clones to every consumer. The background
/// event loop stops when [`shutdown`](Self::shutdown) is called or the last
/// handle is dropped.
///
/// # Example
///
/// ```ignore
/// use tradedesk_gateway::ws::{ConnectionConfig, ConnectionManager, TungsteniteTransport};
///
/// let config = ConnectionConfig::builder().url("wss://feed.example.com/ws").build();
/// let transport = TungsteniteTransport::new(config.connect_timeout());
/// let manager = ConnectionManager::spawn(config, transport);
///
/// manager.subscribe("prices", |msg| println!("{}", msg.data));
/// manager.connect();
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectionManager {
    /// Starts a manager that opens connections with `transport`.
    ///
    /// The manager stays `Disconnected` until [`connect`](Self::connect) is called.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(config: ConnectionConfig, transport: impl Transport + 'static) -> Self {
        Self::with_transport(config, Arc::new(transport))
    }

    /// Starts a manager over a shared transport.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::from_config(&config);

        let shared = Arc::new(Shared {
            router: Arc::new(MessageRouter::new(config.wildcard_channel.clone())),
            config,
            codec: MessageCodec::new(),
            inner: RwLock::new(InternalState::new()),
            observers: RwLock::new(Vec::new()),
            state_tx,
        });

        let driver = Driver {
            shared: Arc::clone(&shared),
            transport,
            policy,
            commands: command_rx,
            pending_open: None,
            inbound: None,
            heartbeat: None,
            retry_at: None,
        };
        tokio::spawn(driver.run());

        Self { shared, commands }
    }

    /// Requests a connection. No-op if already connected or connecting.
    ///
    /// Returns immediately; progress is reported through observers and
    /// [`watch_state`](Self::watch_state).
    pub fn connect(&self) {
        self.shared.inner.write().manual_disconnect = false;
        self.submit(Command::Connect);
    }

    /// Closes the connection and cancels any pending reconnect.
    pub fn disconnect(&self) {
        self.shared.inner.write().manual_disconnect = true;
        self.submit(Command::Disconnect);
    }

    /// Disconnects and stops the background event loop.
    pub fn shutdown(&self) {
        self.shared.inner.write().manual_disconnect = true;
        self.submit(Command::Shutdown);
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!(command = ?command, "Connection manager is shut down");
        }
    }

    /// Sends a message, or queues it until the next successful connect.
    ///
    /// Returns true if the message was handed to the link now, false if it
    /// was queued.
    pub fn send_message(&self, message: Message) -> bool {
        let text = match self.shared.codec.encode(&message) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, kind = %message.kind, "Dropping unencodable message");
                return false;
            }
        };

        let mut inner = self.shared.inner.write();
        if inner.state.is_connected() {
            let sent = inner
                .link
                .as_ref()
                .is_some_and(|link| link.send(Frame::Text(text)).is_ok());
            if sent {
                inner.stats.record_sent(1);
                return true;
            }
            debug!(kind = %message.kind, "Link unavailable, queueing message");
        }

        inner.queue.enqueue(message);
        debug!(queued = inner.queue.len(), "Message queued");
        false
    }

    /// Registers `handler` for messages routed to `channel`.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.shared.router.subscribe(channel, handler)
    }

    /// Registers `handler` for messages on `channel` that pass `filter`.
    pub fn subscribe_with_filter<F, P>(
        &self,
        channel: impl Into<String>,
        handler: F,
        filter: P,
    ) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
        P: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.shared
            .router
            .subscribe_with_filter(channel, handler, filter)
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.router.unsubscribe(id)
    }

    /// Registers a lifecycle observer.
    pub fn add_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.shared.observers.write().push(observer);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.read().state
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Snapshot of the traffic counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.shared.inner.read().stats.clone()
    }

    /// Messages waiting for a connection.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.shared.inner.read().queue.len()
    }

    /// Live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.router.subscription_count()
    }

    /// Reconnect attempts scheduled since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.read().reconnect_attempts
    }

    /// Keep-alive diagnostics for the current connection.
    #[must_use]
    pub fn heartbeat_status(&self) -> HeartbeatStatus {
        self.shared.inner.read().heartbeat.clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The router inbound messages are dispatched through.
    #[must_use]
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.shared.router
    }

    /// The configuration this manager was started with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .field("queue_size", &self.queue_size())
            .finish_non_exhaustive()
    }
}

/// Owns every timer and the link; the only writer of `state`.
struct Driver {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    pending_open: Option<BoxFuture<'static, Result<Link, NetworkError>>>,
    inbound: Option<LinkEvents>,
    heartbeat: Option<HeartbeatMonitor>,
    retry_at: Option<Instant>,
}

impl Driver {
    async fn run(mut self) {
        debug!(transport = self.transport.name(), "Connection driver started");
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Connect) => self.handle_connect(),
                    Some(Command::Disconnect) => self.handle_disconnect(),
                    Some(Command::Shutdown) | None => {
                        self.handle_disconnect();
                        break;
                    }
                },

                result = next_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.handle_open(result);
                }

                event = next_event(&mut self.inbound) => self.handle_link_event(event),

                () = next_probe(&mut self.heartbeat) => self.send_probe(),

                () = retry_due(self.retry_at) => {
                    self.retry_at = None;
                    if self.shared.inner.read().manual_disconnect {
                        debug!("Skipping reconnect after manual disconnect");
                    } else {
                        self.begin_attempt();
                    }
                }
            }
        }
        debug!("Connection driver stopped");
    }

    fn handle_connect(&mut self) {
        let state = {
            let mut inner = self.shared.inner.write();
            inner.manual_disconnect = false;
            inner.state
        };
        if state.is_connected() || self.pending_open.is_some() {
            debug!(state = %state, "Connect ignored");
            return;
        }

        self.shared.inner.write().reconnect_attempts = 0;
        self.retry_at = None;
        self.begin_attempt();
    }

    fn begin_attempt(&mut self) {
        let mut events = Vec::new();
        self.shared
            .transition(ConnectionState::Connecting, &mut events);
        self.shared.emit(events);

        let transport = Arc::clone(&self.transport);
        let url = self.shared.config.url.clone();
        info!(url = %url, transport = transport.name(), "Opening connection");
        self.pending_open = Some(Box::pin(async move { transport.open(&url).await }));
    }

    fn handle_open(&mut self, result: Result<Link, NetworkError>) {
        match result {
            Ok(link) => {
                let (sender, events) = link.into_parts();
                let codec = self.shared.codec;

                let (reconnected, flushed, remaining) = {
                    let mut inner = self.shared.inner.write();
                    let reconnected = inner.mark_connected(sender.clone());
                    let flushed = inner.queue.flush(|message| {
                        let text = codec.encode(message)?;
                        sender
                            .send(Frame::Text(text))
                            .map_err(|_| NetworkError::ConnectionClosed {
                                code: CLOSE_ABNORMAL,
                                reason: "link closed during flush".to_string(),
                            })
                    });
                    inner.stats.record_sent(flushed as u64);
                    (reconnected, flushed, inner.queue.len())
                };

                self.inbound = Some(events);
                self.heartbeat = self
                    .shared
                    .config
                    .heartbeat_interval()
                    .and_then(HeartbeatMonitor::start);

                info!(
                    url = %self.shared.config.url,
                    reconnected,
                    flushed,
                    "Connection established"
                );
                if remaining > 0 {
                    warn!(remaining, "Outbound queue not fully flushed");
                }

                self.shared.emit(vec![
                    LifecycleEvent::StateChanged(ConnectionState::Connected),
                    LifecycleEvent::Connected,
                ]);
            }
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                let mut events = Vec::new();
                self.shared.transition(ConnectionState::Error, &mut events);
                events.push(LifecycleEvent::Error(e));
                self.shared.emit(events);
                self.schedule_reconnect();
            }
        }
    }

    fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Frame(text)) => self.handle_frame(&text),
            Some(LinkEvent::Closed { code, reason }) => self.handle_closed(code, reason),
            Some(LinkEvent::Error(cause)) => self.handle_link_error(cause),
            None => self.handle_closed(CLOSE_ABNORMAL, "Connection lost".to_string()),
        }
    }

    fn handle_frame(&self, text: &str) {
        self.shared.inner.write().stats.record_received();

        let message = match self.shared.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        if message.is_pong() {
            self.shared.inner.write().record_pong();
            debug!("Pong received");
        }
        self.shared.router.dispatch(&message);
    }

    fn handle_closed(&mut self, code: u16, reason: String) {
        self.teardown_link();
        info!(code, reason = %reason, "Connection closed");

        let mut events = Vec::new();
        self.shared
            .transition(ConnectionState::Disconnected, &mut events);
        events.push(LifecycleEvent::Disconnected { code, reason });
        self.shared.emit(events);
        self.schedule_reconnect();
    }

    fn handle_link_error(&mut self, cause: String) {
        self.teardown_link();
        error!(cause = %cause, "Connection failed");

        let mut events = Vec::new();
        self.shared.transition(ConnectionState::Error, &mut events);
        events.push(LifecycleEvent::Error(NetworkError::websocket(cause)));
        self.shared.emit(events);
        self.schedule_reconnect();
    }

    fn teardown_link(&mut self) {
        self.inbound = None;
        self.heartbeat = None;
        drop(self.shared.inner.write().release_link());
    }

    fn schedule_reconnect(&mut self) {
        let (manual, attempts) = {
            let inner = self.shared.inner.read();
            (inner.manual_disconnect, inner.reconnect_attempts)
        };
        if manual {
            debug!("Manual disconnect, not reconnecting");
            return;
        }

        let max_attempts = self.policy.max_attempts();
        match self.policy.next_delay(attempts) {
            Some(delay) => {
                let attempt = attempts + 1;
                self.shared.inner.write().reconnect_attempts = attempt;
                self.retry_at = Some(Instant::now() + delay);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.shared.emit(vec![LifecycleEvent::Reconnecting {
                    attempt,
                    max_attempts,
                }]);
            }
            None => {
                warn!(attempts, "Giving up on reconnecting");
                let mut events = Vec::new();
                self.shared
                    .transition(ConnectionState::Disconnected, &mut events);
                events.push(LifecycleEvent::Error(NetworkError::ReconnectExhausted {
                    attempts,
                }));
                self.shared.emit(events);
            }
        }
    }

    fn handle_disconnect(&mut self) {
        self.retry_at = None;
        self.pending_open = None;
        self.inbound = None;
        self.heartbeat = None;

        let reason = "Client disconnect".to_string();
        let dropped = {
            let mut inner = self.shared.inner.write();
            inner.manual_disconnect = true;
            if let Some(link) = inner.release_link() {
                let _ = link.send(Frame::Close {
                    code: CLOSE_NORMAL,
                    reason: reason.clone(),
                });
            }
            if self.shared.config.clear_queue_on_disconnect {
                inner.queue.clear()
            } else {
                0
            }
        };
        if dropped > 0 {
            info!(dropped, "Discarded queued messages on disconnect");
        }

        let mut events = Vec::new();
        self.shared
            .transition(ConnectionState::Disconnected, &mut events);
        if !events.is_empty() {
            info!("Disconnected");
            events.push(LifecycleEvent::Disconnected {
                code: CLOSE_NORMAL,
                reason,
            });
        }
        self.shared.emit(events);
    }

    fn send_probe(&self) {
        let text = match self.shared.codec.encode(&Message::ping()) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode heartbeat");
                return;
            }
        };

        let mut inner = self.shared.inner.write();
        let sent = inner
            .link
            .as_ref()
            .is_some_and(|link| link.send(Frame::Text(text)).is_ok());
        if sent {
            inner.stats.record_sent(1);
            inner.record_ping();
            debug!("Heartbeat sent");
        } else {
            warn!("Failed to send heartbeat");
        }
    }
}

async fn next_open(
    pending_open: &mut Option<BoxFuture<'static, Result<Link, NetworkError>>>,
) -> Result<Link, NetworkError> {
    match pending_open {
        Some(open) => open.await,
        None => pending().await,
    }
}

async fn next_event(inbound: &mut Option<LinkEvents>) -> Option<LinkEvent> {
    match inbound {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}

async fn next_probe(heartbeat: &mut Option<HeartbeatMonitor>) {
    match heartbeat {
        Some(monitor) => monitor.tick().await,
        None => pending().await,
    }
}

async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::{MockRemote, MockTransport};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|e| e.starts_with(prefix))
                .count()
        }
    }

    impl ConnectionObserver for Recorder {
        fn on_connected(&self) {
            self.events.lock().push("connected".into());
        }

        fn on_disconnected(&self, code: u16, _reason: &str) {
            self.events.lock().push(format!("disconnected:{code}"));
        }

        fn on_error(&self, error: &NetworkError) {
            let tag = match error {
                NetworkError::ReconnectExhausted { attempts } => format!("exhausted:{attempts}"),
                NetworkError::ConnectionFailed { .. } => "open_failed".to_string(),
                other => format!("other:{other}"),
            };
            self.events.lock().push(format!("error:{tag}"));
        }

        fn on_state_change(&self, state: ConnectionState) {
            self.events.lock().push(format!("state:{state}"));
        }

        fn on_reconnecting(&self, attempt: u32, max_attempts: u32) {
            self.events
                .lock()
                .push(format!("reconnecting:{attempt}/{max_attempts}"));
        }
    }

    fn config(max_attempts: u32, heartbeat: Duration) -> ConnectionConfig {
        ConnectionConfig::builder()
            .url("ws://mock.test/feed")
            .reconnect_interval(Duration::from_millis(3_000))
            .max_reconnect_attempts(max_attempts)
            .heartbeat_interval(heartbeat)
            .build()
    }

    fn start(config: ConnectionConfig) -> (ConnectionManager, MockTransport, Arc<Recorder>) {
        let transport = MockTransport::new();
        let manager = ConnectionManager::spawn(config, transport.clone());
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());
        (manager, transport, recorder)
    }

    /// Lets the driver run until it is idle. The paused clock only advances
    /// once every task is waiting.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn msg(kind: &str) -> Message {
        Message::new(kind, Value::Null)
    }

    fn kinds(remote: &MockRemote) -> Vec<String> {
        remote.sent_messages().into_iter().map(|m| m.kind).collect()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Message) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &Message| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_lifecycle_events() {
        let (manager, transport, recorder) = start(config(5, Duration::ZERO));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect();
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(transport.open_count(), 1);
        assert_eq!(
            recorder.events(),
            ["state:Connecting", "state:Connected", "connected"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_messages_flush_in_order_before_new_sends() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));

        assert!(!manager.send_message(msg("A")));
        assert!(!manager.send_message(msg("B")));
        assert_eq!(manager.queue_size(), 2);

        manager.connect();
        settle().await;
        assert_eq!(manager.queue_size(), 0);

        assert!(manager.send_message(msg("C")));

        let remote = transport.last_remote().unwrap();
        assert_eq!(kinds(&remote), ["A", "B", "C"]);
        assert_eq!(manager.stats().messages_sent, 3);
        assert!(manager.stats().last_activity.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_when_connected() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;
        manager.connect();
        settle().await;

        assert_eq!(transport.open_count(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_connecting() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        transport.set_open_delay(Duration::from_secs(5));

        manager.connect();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.connect();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(transport.open_count(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded_and_spaced() {
        let (manager, transport, recorder) = start(config(2, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.set_refuse(true);
        let failed_at = Instant::now();
        transport.last_remote().unwrap().close(CLOSE_ABNORMAL, "network drop");
        tokio::time::sleep(Duration::from_secs(30)).await;

        let opens = transport.open_times();
        assert_eq!(opens.len(), 3);
        assert_eq!(opens[1] - failed_at, Duration::from_millis(3_000));
        assert_eq!(opens[2] - failed_at, Duration::from_millis(6_000));

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.stats().reconnections, 0);
        assert_eq!(recorder.count("reconnecting"), 2);
        assert!(recorder.events().contains(&"reconnecting:2/2".to_string()));
        assert_eq!(
            recorder.events().last().map(String::as_str),
            Some("error:exhausted:2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_disables_reconnect() {
        let (manager, transport, recorder) = start(config(0, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.last_remote().unwrap().close(CLOSE_ABNORMAL, "gone");
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(recorder.count("reconnecting"), 0);
        assert!(recorder.events().contains(&"error:exhausted:0".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_connect_after_exhaustion_resets_attempts() {
        let (manager, transport, _) = start(config(1, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.set_refuse(true);
        transport.last_remote().unwrap().close(CLOSE_ABNORMAL, "gone");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.open_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        transport.set_refuse(false);
        manager.connect();
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
        assert_eq!(manager.stats().reconnections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_enters_error_then_retries() {
        let (manager, transport, recorder) = start(config(3, Duration::ZERO));
        transport.fail_next_opens(1);

        manager.connect();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Error);
        assert_eq!(manager.reconnect_attempts(), 1);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert!(manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
        // Never connected before, so this is not a reconnection.
        assert_eq!(manager.stats().reconnections, 0);
        assert!(recorder.events().contains(&"error:open_failed".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnection_counter() {
        let (manager, transport, recorder) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.last_remote().unwrap().close(CLOSE_ABNORMAL, "drop");
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert!(manager.is_connected());
        assert_eq!(manager.stats().reconnections, 1);
        assert_eq!(transport.open_count(), 2);
        assert_eq!(recorder.count("connected"), 2);
        assert!(recorder.events().contains(&"disconnected:1006".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_error_enters_error_state() {
        let (manager, transport, recorder) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.last_remote().unwrap().fail("reset by peer");
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Error);
        assert_eq!(recorder.count("error:other"), 1);
        assert_eq!(recorder.count("reconnecting:1/5"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_suppresses_stale_close() {
        let (manager, transport, recorder) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;
        let remote = transport.last_remote().unwrap();

        remote.close(CLOSE_ABNORMAL, "late");
        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(recorder.count("reconnecting"), 0);
        assert_eq!(recorder.count("disconnected:1000"), 1);
        assert!(matches!(
            remote.sent_frames().last(),
            Some(Frame::Close { code: CLOSE_NORMAL, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_scheduled_retry() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.last_remote().unwrap().close(CLOSE_ABNORMAL, "drop");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(manager.reconnect_attempts(), 1);

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence_and_stop() {
        let (manager, transport, _) = start(config(5, Duration::from_secs(30)));
        manager.connect();
        settle().await;
        let first = transport.last_remote().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(kinds(&first), ["ping"]);
        assert!(manager.heartbeat_status().awaiting_pong);

        first.push_message(&Message::pong());
        settle().await;
        assert!(!manager.heartbeat_status().awaiting_pong);
        assert!(manager.heartbeat_status().last_pong.is_some());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(kinds(&first), ["ping", "ping"]);

        first.close(CLOSE_ABNORMAL, "drop");
        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(kinds(&first), ["ping", "ping"]);
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_restarts_fresh_on_reconnect() {
        let (manager, transport, _) = start(config(5, Duration::from_secs(30)));
        manager.connect();
        settle().await;
        let first = transport.last_remote().unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        first.close(CLOSE_ABNORMAL, "drop");
        tokio::time::sleep(Duration::from_secs(4)).await;
        let second = transport.remote(1).unwrap();

        // Reopened 3s after the drop; first probe is a full period later.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(kinds(&second).is_empty());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(kinds(&second), ["ping"]);
        assert!(kinds(&first).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let (manager, transport, recorder) = start(config(5, Duration::ZERO));
        let (hits, handler) = counter();
        manager.subscribe("prices", handler);
        manager.connect();
        settle().await;

        let remote = transport.last_remote().unwrap();
        remote.push_text("{not json");
        remote.push_message(&msg("price_update").with_channel("prices"));
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(manager.stats().messages_received, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.count("error"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_subscription_routing() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        let (hits, handler) = counter();
        manager.subscribe_with_filter("prices", handler, |m| {
            m.symbol.as_deref() == Some("BTC-USD")
        });
        let (all, wildcard) = counter();
        manager.subscribe("*", wildcard);
        assert_eq!(manager.subscription_count(), 2);

        manager.connect();
        settle().await;
        let remote = transport.last_remote().unwrap();
        for symbol in ["BTC-USD", "ETH-USD"] {
            remote.push_message(
                &Message::new("price_update", json!({"price": 1.0}))
                    .with_channel("prices")
                    .with_symbol(symbol),
            );
        }
        remote.push_message(&msg("fill").with_channel("orders").with_symbol("BTC-USD"));
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_is_still_routed() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        let (hits, handler) = counter();
        let id = manager.subscribe("pong", handler);
        manager.connect();
        settle().await;

        transport.last_remote().unwrap().push_message(&Message::pong());
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(manager.unsubscribe(id));
        assert!(!manager.unsubscribe(id));
        assert_eq!(manager.subscription_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_may_send_during_dispatch() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        let replier = manager.clone();
        manager.subscribe("orders", move |_| {
            replier.send_message(msg("order_ack_seen"));
        });
        manager.connect();
        settle().await;

        let remote = transport.last_remote().unwrap();
        remote.push_message(&msg("fill").with_channel("orders"));
        settle().await;

        assert_eq!(kinds(&remote), ["order_ack_seen"]);
        manager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_cleared_on_manual_disconnect() {
        let (manager, _transport, _) = start(config(5, Duration::ZERO));
        manager.send_message(msg("stale"));
        manager.disconnect();
        settle().await;
        assert_eq!(manager.queue_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_kept_on_manual_disconnect_when_configured() {
        let mut cfg = config(5, Duration::ZERO);
        cfg.clear_queue_on_disconnect = false;
        let (manager, transport, _) = start(cfg);

        manager.send_message(msg("keep"));
        manager.disconnect();
        settle().await;
        assert_eq!(manager.queue_size(), 1);

        manager.connect();
        settle().await;
        assert_eq!(kinds(&transport.last_remote().unwrap()), ["keep"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_survives_automatic_reconnect() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;

        transport.last_remote().unwrap().close(CLOSE_ABNORMAL, "drop");
        settle().await;
        assert!(!manager.send_message(msg("during_outage")));

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert!(manager.is_connected());
        assert_eq!(manager.queue_size(), 0);
        assert_eq!(kinds(&transport.remote(1).unwrap()), ["during_outage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_state() {
        let (manager, _transport, _) = start(config(5, Duration::ZERO));
        let mut rx = manager.watch_state();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);

        manager.connect();
        let state = *rx.wait_for(ConnectionState::is_connected).await.unwrap();
        assert_eq!(state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_is_isolated() {
        struct Panics;
        impl ConnectionObserver for Panics {
            fn on_connected(&self) {
                panic!("observer bug");
            }
        }

        let (manager, _transport, recorder) = start(config(5, Duration::ZERO));
        manager.add_observer(Arc::new(Panics));
        manager.connect();
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(recorder.count("connected"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_link() {
        let (manager, transport, _) = start(config(5, Duration::ZERO));
        manager.connect();
        settle().await;

        manager.shutdown();
        settle().await;

        let remote = transport.last_remote().unwrap();
        assert!(remote.is_released());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.connect();
        settle().await;
        assert_eq!(transport.open_count(), 1);
    }
}
