//! Wire channel adapters.
//!
//! A [`Transport`] opens one physical duplex connection and hands it back as a
//! [`Link`]: an outbound frame sender plus an inbound event receiver. The
//! connection manager only ever talks to a `Link`, so the socket primitive
//! behind it is swappable:
//!
//! - [`TungsteniteTransport`] - real websocket connection
//! - [`SimulatedTransport`] - in-process fake market feed for demos
//! - [`MockTransport`] - scripted double for tests

use async_trait::async_trait;
use tokio::sync::mpsc;
use tradedesk_core::error::NetworkError;

pub mod mock;
pub mod simulated;
pub mod tungstenite;

pub use mock::{MockRemote, MockTransport};
pub use simulated::{SimulatedTransport, SimulationConfig};
pub use tungstenite::TungsteniteTransport;

/// Close code for a normal, client-initiated closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when a link ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Raw frame handed to a link for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text payload.
    Text(String),
    /// Close the connection with a code and reason.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl Frame {
    /// Returns the text payload, if this is a text frame.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Close { .. } => None,
        }
    }
}

/// Event raised by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame arrived.
    Frame(String),
    /// The connection closed.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The connection failed.
    Error(String),
}

/// Outbound side of a link.
pub type LinkSender = mpsc::UnboundedSender<Frame>;

/// Inbound side of a link.
pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

/// An open connection as seen by the connection manager.
#[derive(Debug)]
pub struct Link {
    sender: LinkSender,
    events: LinkEvents,
}

impl Link {
    /// Creates a link and the peer end a transport drives.
    #[must_use]
    pub fn pair() -> (Self, LinkPeer) {
        let (sender, outbound) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        (
            Self { sender, events },
            LinkPeer {
                outbound,
                events: event_tx,
            },
        )
    }

    /// Splits the link into its outbound sender and inbound events.
    #[must_use]
    pub fn into_parts(self) -> (LinkSender, LinkEvents) {
        (self.sender, self.events)
    }
}

/// Transport-side end of a [`Link`].
#[derive(Debug)]
pub struct LinkPeer {
    /// Frames the manager wants written.
    pub outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkPeer {
    /// Delivers an inbound text frame. Returns false once the manager has let go of the link.
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Frame(text.into())).is_ok()
    }

    /// Reports that the connection closed.
    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        let _ = self.events.send(LinkEvent::Closed {
            code,
            reason: reason.into(),
        });
    }

    /// Reports that the connection failed.
    pub fn failed(&self, cause: impl Into<String>) {
        let _ = self.events.send(LinkEvent::Error(cause.into()));
    }

    /// Returns true once the manager has dropped its side of the link.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.events.is_closed()
    }
}

/// Opens physical connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Opens a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the connection cannot be established.
    async fn open(&self, url: &str) -> Result<Link, NetworkError>;
}
