//! # TradeDesk Gateway
//!
//! The persistent real-time connection layer of the TradeDesk dashboard.
//!
//! One [`ConnectionManager`](ws::ConnectionManager) owns a long-lived duplex
//! channel to the backend: it opens it, keeps it alive with heartbeat probes,
//! reconnects after failures, fans inbound messages out to channel
//! subscribers and buffers outbound messages while the link is down.
//!
//! # Example
//!
//! ```ignore
//! use tradedesk_gateway::prelude::*;
//!
//! let config = ConnectionConfig::builder()
//!     .url("wss://feed.example.com/ws")
//!     .build();
//! let transport = TungsteniteTransport::new(config.connect_timeout());
//! let manager = ConnectionManager::spawn(config, transport);
//!
//! manager.subscribe("prices", |msg| println!("{msg:?}"));
//! manager.connect();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

/// Real-time connection infrastructure
pub mod ws;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ws::{
        ConnectionConfig, ConnectionManager, ConnectionObserver, ConnectionState,
        ConnectionStats, Message, SimulatedTransport, SimulationConfig, SubscriptionId,
        Transport, TungsteniteTransport,
    };
    pub use tradedesk_core::error::NetworkError;
}
