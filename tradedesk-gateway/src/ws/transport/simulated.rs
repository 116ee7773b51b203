//! In-process market feed used when no live endpoint is configured.
//!
//! Emits random-walk `price_update`s per symbol every tick, plus periodic
//! `balance_update` and `position_update` messages. Answers heartbeat probes
//! with `pong` and acknowledges every other outbound message on `orders`.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};
use tradedesk_core::error::NetworkError;

use super::{Frame, Link, LinkPeer, Transport};
use crate::ws::message::{Message, MessageCodec};

/// Channel acknowledgements are published on.
pub const ORDERS_CHANNEL: &str = "orders";

/// Channel price updates are published on.
pub const PRICES_CHANNEL: &str = "prices";

/// Settings for the simulated feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Milliseconds between price ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Symbols that receive price updates.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Account balance reported by the first `balance_update`.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,

    /// Emit balance and position updates every this many ticks.
    #[serde(default = "default_account_every")]
    pub account_every: u32,

    /// Fixed RNG seed. Random when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_symbols() -> Vec<String> {
    vec!["BTC-USD".into(), "ETH-USD".into(), "SOL-USD".into()]
}

fn default_starting_balance() -> f64 {
    100_000.0
}

fn default_account_every() -> u32 {
    5
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            symbols: default_symbols(),
            starting_balance: default_starting_balance(),
            account_every: default_account_every(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Returns the tick interval as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Transport that fabricates a market feed instead of opening a socket.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    config: SimulationConfig,
}

impl SimulatedTransport {
    /// Creates a simulated transport.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn open(&self, url: &str) -> Result<Link, NetworkError> {
        let (link, peer) = Link::pair();
        let feed = Feed::new(&self.config);
        tokio::spawn(feed.run(peer, self.config.tick_interval()));
        debug!(url = %url, symbols = self.config.symbols.len(), "Simulated feed opened");
        Ok(link)
    }
}

struct Feed {
    rng: StdRng,
    codec: MessageCodec,
    prices: BTreeMap<String, f64>,
    balance: f64,
    positions: BTreeMap<String, f64>,
    account_every: u32,
    ticks: u64,
}

impl Feed {
    fn new(config: &SimulationConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let prices = config
            .symbols
            .iter()
            .map(|s| (s.clone(), starting_price(s)))
            .collect();
        Self {
            rng,
            codec: MessageCodec::new(),
            prices,
            balance: config.starting_balance,
            positions: BTreeMap::new(),
            account_every: config.account_every.max(1),
            ticks: 0,
        }
    }

    async fn run(mut self, mut peer: LinkPeer, period: Duration) {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                outbound = peer.outbound.recv() => match outbound {
                    Some(Frame::Text(text)) => {
                        for reply in self.respond(&text) {
                            if !self.emit(&peer, &reply) {
                                return;
                            }
                        }
                    }
                    Some(Frame::Close { code, .. }) => {
                        debug!(code, "Simulated feed closed by client");
                        return;
                    }
                    None => return,
                },
                _ = ticker.tick() => {
                    for update in self.tick() {
                        if !self.emit(&peer, &update) {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn emit(&self, peer: &LinkPeer, message: &Message) -> bool {
        match self.codec.encode(message) {
            Ok(text) => peer.deliver(text),
            Err(e) => {
                warn!(error = %e, "Simulated feed failed to encode message");
                true
            }
        }
    }

    fn respond(&mut self, text: &str) -> Vec<Message> {
        let Ok(message) = self.codec.decode(text) else {
            trace!("Simulated feed ignoring undecodable frame");
            return Vec::new();
        };

        if message.is_ping() {
            return vec![Message::pong()];
        }

        if message.channel.as_deref() == Some(ORDERS_CHANNEL) {
            if let Some(symbol) = message.data.get("symbol").and_then(|s| s.as_str()) {
                let qty = message
                    .data
                    .get("quantity")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                *self.positions.entry(symbol.to_string()).or_default() += qty;
            }
        }

        let ack = Message::new(
            "ack",
            json!({ "request_type": message.kind, "request": message.data }),
        )
        .with_channel(ORDERS_CHANNEL);
        vec![ack]
    }

    fn tick(&mut self) -> Vec<Message> {
        self.ticks += 1;
        let mut out = Vec::with_capacity(self.prices.len() + 2);

        for (symbol, price) in &mut self.prices {
            let change = self.rng.gen_range(-0.005..0.005);
            *price = (*price * (1.0 + change)).max(0.01);
            out.push(
                Message::new(
                    "price_update",
                    json!({ "price": round2(*price), "change_pct": round2(change * 100.0) }),
                )
                .with_channel(PRICES_CHANNEL)
                .with_symbol(symbol.clone()),
            );
        }

        if self.ticks % u64::from(self.account_every) == 0 {
            self.balance += self.rng.gen_range(-250.0..250.0);
            out.push(
                Message::new("balance_update", json!({ "total": round2(self.balance) }))
                    .with_channel("balance"),
            );
            let positions: Vec<_> = self
                .positions
                .iter()
                .map(|(symbol, qty)| {
                    let mark = self.prices.get(symbol).copied().unwrap_or_default();
                    json!({ "symbol": symbol, "quantity": qty, "mark_price": round2(mark) })
                })
                .collect();
            out.push(
                Message::new("position_update", json!({ "positions": positions }))
                    .with_channel("positions"),
            );
        }

        out
    }
}

fn starting_price(symbol: &str) -> f64 {
    match symbol {
        "BTC-USD" => 65_000.0,
        "ETH-USD" => 3_500.0,
        "SOL-USD" => 150.0,
        _ => 100.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
