//! Real-time connection infrastructure.
//!
//! This module provides:
//! - A connection manager with constant-interval reconnection
//! - JSON heartbeat probes while connected
//! - An outbound queue flushed in order on every connect
//! - Channel-based fan-out of inbound messages
//! - Swappable transports: live websocket, simulated feed, test mock
//!
//! # Example
//!
//! ```ignore
//! use tradedesk_gateway::ws::{ConnectionConfig, ConnectionManager, Message, SimulatedTransport};
//!
//! let config = ConnectionConfig::builder()
//!     .url("ws://localhost:8080/feed")
//!     .max_reconnect_attempts(5)
//!     .build();
//!
//! let manager = ConnectionManager::spawn(config, SimulatedTransport::default());
//! let id = manager.subscribe("BTC-USD", |msg| println!("{}", msg.data));
//! manager.connect();
//! manager.send_message(Message::new("place_order", data).with_channel("orders"));
//! ```

mod config;
mod heartbeat;
mod manager;
mod message;
mod queue;
mod reconnect;
mod router;
mod state;

pub mod transport;

pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use heartbeat::HeartbeatMonitor;
pub use manager::{ConnectionManager, ConnectionObserver};
pub use message::{Message, MessageCodec, PING_TYPE, PONG_TYPE};
pub use queue::{OutboundQueue, QueuedMessage};
pub use reconnect::ReconnectPolicy;
pub use router::{MessageFilter, MessageHandler, MessageRouter, SubscriptionId};
pub use state::{ConnectionState, ConnectionStats, HeartbeatStatus};
pub use transport::{
    Frame, Link, LinkEvent, LinkPeer, MockRemote, MockTransport, SimulatedTransport,
    SimulationConfig, Transport, TungsteniteTransport,
};
