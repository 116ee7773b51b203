//! Connection state, counters and the manager's shared session record.

#![allow(clippy::redundant_pub_crate)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue::OutboundQueue;
use super::transport::LinkSender;

/// Lifecycle state of a connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected. Also the rest state after reconnect attempts run out.
    #[default]
    Disconnected,
    /// An open request is in flight.
    Connecting,
    /// The link is open.
    Connected,
    /// The last open attempt or the live link failed.
    Error,
}

impl ConnectionState {
    /// Returns true if the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true while an open request is in flight.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Returns true if there is no usable link.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Traffic counters for a connection manager.
///
/// Counters only grow; `last_activity` is overwritten on every send or receive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Frames received from the link, including ones that failed to decode.
    pub messages_received: u64,
    /// Frames handed to the link, including heartbeat probes and flushed messages.
    pub messages_sent: u64,
    /// Successful connects that followed an earlier disconnect.
    pub reconnections: u64,
    /// Time of the most recent send or receive.
    pub last_activity: Option<DateTime<Utc>>,
}

impl ConnectionStats {
    pub(crate) fn record_sent(&mut self, count: u64) {
        if count > 0 {
            self.messages_sent += count;
            self.last_activity = Some(Utc::now());
        }
    }

    pub(crate) fn record_received(&mut self) {
        self.messages_received += 1;
        self.last_activity = Some(Utc::now());
    }
}

/// Keep-alive diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    /// When the last probe was sent.
    pub last_ping: Option<DateTime<Utc>>,
    /// When the last `pong` arrived.
    pub last_pong: Option<DateTime<Utc>>,
    /// Whether a probe is still unanswered.
    pub awaiting_pong: bool,
}

/// Mutable session record shared between the manager handle and its event loop.
///
/// Only the event loop changes `state`; handles read it and use the link and
/// queue under the same lock so sends cannot interleave with a flush.
#[derive(Debug, Default)]
pub(crate) struct InternalState {
    pub state: ConnectionState,
    pub stats: ConnectionStats,
    pub heartbeat: HeartbeatStatus,
    /// Consecutive reconnect attempts scheduled since the last successful connect.
    pub reconnect_attempts: u32,
    pub manual_disconnect: bool,
    pub ever_connected: bool,
    pub queue: OutboundQueue,
    pub link: Option<LinkSender>,
}

impl InternalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state change, returning whether the state actually changed.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        self.state = next;
        true
    }

    /// Marks the session connected.
    ///
    /// Returns true when this connect counts as a reconnection.
    pub fn mark_connected(&mut self, link: LinkSender) -> bool {
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.heartbeat = HeartbeatStatus::default();
        self.link = Some(link);

        let reconnected = self.ever_connected;
        if reconnected {
            self.stats.reconnections += 1;
        }
        self.ever_connected = true;
        reconnected
    }

    /// Drops the link, returning it so the caller can send a close frame.
    pub fn release_link(&mut self) -> Option<LinkSender> {
        self.heartbeat.awaiting_pong = false;
        self.link.take()
    }

    pub fn record_ping(&mut self) {
        self.heartbeat.last_ping = Some(Utc::now());
        self.heartbeat.awaiting_pong = true;
    }

    pub fn record_pong(&mut self) {
        self.heartbeat.last_pong = Some(Utc::now());
        self.heartbeat.awaiting_pong = false;
    }
}
