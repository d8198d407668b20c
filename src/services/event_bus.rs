//! Trade lifecycle events
//!
//! Live and paper brokers publish `TradingEvent`s; the feedback collector
//! subscribes and turns closes into transitions. Events serialize with an
//! `event` tag so the same payloads can travel over any JSON transport.
//!
//! Every subscriber owns a bounded queue. A full queue makes `publish` wait,
//! so a slow subscriber applies backpressure instead of losing events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::{Interval, StrategyConfig};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TradingEvent {
    #[serde(rename = "TRADE_OPEN")]
    TradeOpen {
        symbol: String,
        /// Signed quantity, negative for shorts
        qty: f64,
        price: f64,
        interval: Interval,
        #[serde(default)]
        strategy_config: StrategyConfig,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "TRADE_CLOSE")]
    TradeClose {
        symbol: String,
        exit_price: f64,
        /// Realized PnL reported by the broker
        reward: f64,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        strategy_config: StrategyConfig,
        #[serde(default)]
        missed_pnl: f64,
        #[serde(default)]
        holding_cost: f64,
        #[serde(default)]
        slippage_penalty: f64,
        #[serde(default)]
        capital_efficiency: f64,
    },
    #[serde(rename = "M2M_PNL")]
    MarkToMarket {
        symbol: String,
        days_held: f64,
        capital_efficiency: f64,
        unrealized_pnl: f64,
        timestamp: DateTime<Utc>,
    },
}

impl TradingEvent {
    pub fn symbol(&self) -> &str {
        match self {
            TradingEvent::TradeOpen { symbol, .. }
            | TradingEvent::TradeClose { symbol, .. }
            | TradingEvent::MarkToMarket { symbol, .. } => symbol,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TradingEvent::TradeOpen { timestamp, .. }
            | TradingEvent::TradeClose { timestamp, .. }
            | TradingEvent::MarkToMarket { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TradingEvent::TradeOpen { .. } => "TRADE_OPEN",
            TradingEvent::TradeClose { .. } => "TRADE_CLOSE",
            TradingEvent::MarkToMarket { .. } => "M2M_PNL",
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// In-process fan-out of trading events
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<DashMap<u64, mpsc::Sender<TradingEvent>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    /// Deliver to every live subscriber, waiting while a queue is full.
    /// Returns how many received it.
    pub async fn publish(&self, event: TradingEvent) -> usize {
        let kind = event.kind();
        let senders: Vec<(u64, mpsc::Sender<TradingEvent>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        if senders.is_empty() {
            debug!(kind, "event dropped, no subscribers");
            return 0;
        }

        let mut receivers = 0;
        for (id, tx) in senders {
            if tx.send(event.clone()).await.is_ok() {
                receivers += 1;
            } else {
                self.subscribers.remove(&id);
                debug!(kind, subscriber = id, "subscriber gone, removed");
            }
        }
        trace!(kind, receivers, "event published");
        receivers
    }

    /// New subscriber queue. The receiver yields `None` once every clone of
    /// the bus is dropped.
    pub fn subscribe(&self) -> mpsc::Receiver<TradingEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_uses_event_tag() {
        let raw = r#"{
            "event": "TRADE_CLOSE",
            "symbol": "AAPL",
            "exit_price": 191.5,
            "reward": 12.0,
            "timestamp": "2024-03-05T20:00:00Z",
            "slippage_penalty": 0.4
        }"#;
        let event = TradingEvent::from_json(raw).unwrap();
        assert_eq!(event.kind(), "TRADE_CLOSE");
        assert_eq!(event.symbol(), "AAPL");
        match &event {
            TradingEvent::TradeClose {
                missed_pnl,
                slippage_penalty,
                strategy_config,
                ..
            } => {
                assert_eq!(*missed_pnl, 0.0);
                assert_eq!(*slippage_penalty, 0.4);
                assert!(strategy_config.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let json = event.to_json().unwrap();
        assert!(json.contains(r#""event":"TRADE_CLOSE""#));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let event = TradingEvent::MarkToMarket {
            symbol: "MSFT".into(),
            days_held: 1.0,
            capital_efficiency: 0.01,
            unrealized_pnl: 3.0,
            timestamp: Utc::now(),
        };
        assert_eq!(bus.publish(event.clone()).await, 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(event.clone()).await, 1);
        assert_eq!(rx.recv().await.unwrap(), event);

        drop(rx);
        assert_eq!(bus.publish(event).await, 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_waits_instead_of_dropping() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    let event = TradingEvent::MarkToMarket {
                        symbol: format!("S{i}"),
                        days_held: 1.0,
                        capital_efficiency: 0.0,
                        unrealized_pnl: i as f64,
                        timestamp: Utc::now(),
                    };
                    assert_eq!(bus.publish(event).await, 1);
                }
            })
        };

        let mut symbols = Vec::new();
        while symbols.len() < 20 {
            symbols.push(rx.recv().await.unwrap().symbol().to_string());
        }
        publisher.await.unwrap();
        let expected: Vec<String> = (0..20).map(|i| format!("S{i}")).collect();
        assert_eq!(symbols, expected);

        drop(bus);
        assert!(rx.recv().await.is_none());
    }
}
