mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::broadcast;
use tradeloop::adapters::SyntheticBarProvider;
use tradeloop::coordinator::{LearningLoop, UniverseConfig};
use tradeloop::domain::{Interval, Phase, StrategyConfig, VolatilityRegime};
use tradeloop::rl::{PhaseConfig, ReplayBuffer, RewardAttributor};
use tradeloop::services::{
    CachedFeatureProvider, EventBus, FeatureConfig, FeedbackCollector, TradingEvent, REAL_SOURCE,
};
use tradeloop::strategy::{seeded_rng, ExecutionSimConfig, ExecutionSimulator, FixedRegime};

fn open(symbol: &str, day: u32) -> TradingEvent {
    TradingEvent::TradeOpen {
        symbol: symbol.to_string(),
        qty: 5.0,
        price: 50.0,
        interval: Interval::Day1,
        strategy_config: StrategyConfig::new(),
        timestamp: Utc.with_ymd_and_hms(2024, 4, day, 14, 30, 0).unwrap(),
    }
}

fn close(symbol: &str, day: u32, pnl: f64) -> TradingEvent {
    TradingEvent::TradeClose {
        symbol: symbol.to_string(),
        exit_price: 50.0 + pnl / 5.0,
        reward: pnl,
        timestamp: Utc.with_ymd_and_hms(2024, 4, day, 20, 0, 0).unwrap(),
        strategy_config: StrategyConfig::new(),
        missed_pnl: 0.0,
        holding_cost: 0.0,
        slippage_penalty: 0.0,
        capital_efficiency: 0.0,
    }
}

async fn wait_for_len(buffer: &ReplayBuffer, len: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while buffer.len().await < len {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("collector did not record in time");
}

#[tokio::test]
async fn real_trade_feedback_promotes_the_controller() {
    let mut controller = common::controller(PhaseConfig {
        real_trade_threshold: 2,
        ..Default::default()
    });
    let buffer = controller.buffer().clone();

    let bus = EventBus::new(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let collector = FeedbackCollector::new(
        buffer.clone(),
        RewardAttributor::default(),
        controller.subscribe(),
    );
    let handle = collector.spawn(&bus, shutdown_tx.subscribe());

    for (i, symbol) in ["AAPL", "MSFT", "NVDA"].iter().enumerate() {
        bus.publish(open(symbol, 1)).await;
        bus.publish(close(symbol, 3, 10.0 * (i as f64 + 1.0))).await;
    }
    wait_for_len(&buffer, 3).await;
    assert_eq!(buffer.count_real_trades().await, 3);

    assert_eq!(controller.update_phase().await.unwrap(), Phase::Guided);

    // Closes after the promotion carry the new phase
    bus.publish(open("AMZN", 8)).await;
    bus.publish(close("AMZN", 9, -5.0)).await;
    wait_for_len(&buffer, 4).await;

    let snapshot = buffer.snapshot().await;
    let last = snapshot.last().unwrap();
    assert_eq!(last.symbol, "AMZN");
    assert_eq!(last.tags.source, REAL_SOURCE);
    assert_eq!(last.tags.phase, Phase::Guided);
    assert!(snapshot.iter().all(|t| t.done));

    shutdown_tx.send(()).unwrap();
    assert_eq!(handle.await.unwrap(), 4);
}

#[tokio::test]
async fn closes_beyond_bus_capacity_are_all_recorded() {
    let controller = common::controller(PhaseConfig::default());
    let buffer = controller.buffer().clone();

    let bus = EventBus::new(4);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let collector = FeedbackCollector::new(
        buffer.clone(),
        RewardAttributor::default(),
        controller.subscribe(),
    );
    let handle = collector.spawn(&bus, shutdown_rx);

    for i in 0..50 {
        let symbol = format!("SYM{i}");
        bus.publish(open(&symbol, 1)).await;
        bus.publish(close(&symbol, 2, 1.0)).await;
    }
    // Dropping the bus closes the queue once it drains
    drop(bus);

    assert_eq!(handle.await.unwrap(), 50);
    assert_eq!(buffer.count_real_trades().await, 50);
    assert_eq!(buffer.total_recorded().await, 50);
}

#[tokio::test]
async fn guided_days_are_tagged_with_the_guided_source() {
    let controller = common::controller(PhaseConfig {
        initial_phase: Phase::Guided,
        ..Default::default()
    });
    let bars = Arc::new(SyntheticBarProvider::new(21));
    let features = CachedFeatureProvider::new(
        FeatureConfig {
            poll_interval_secs: 0.01,
            backfill_days: 60,
            ..Default::default()
        },
        bars.clone(),
    );
    let simulator = ExecutionSimulator::new(
        ExecutionSimConfig::default(),
        bars,
        RewardAttributor::default(),
        seeded_rng(Some(5)),
    );
    let mut sweep = LearningLoop::new(
        UniverseConfig {
            symbols: vec!["AAPL".into(), "MSFT".into(), "JPM".into()],
            ..Default::default()
        },
        controller,
        Arc::new(features),
        Duration::from_secs(10),
        Arc::new(FixedRegime(VolatilityRegime::Low)),
        simulator,
    );

    let start = NaiveDate::from_ymd_opt(2024, 7, 8).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 7, 12).unwrap();
    let reports = sweep.run(start, end).await.unwrap();
    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.phase_before >= Phase::Guided));
    assert!(reports.iter().all(|r| r.skipped.is_empty()));

    let recorded = sweep.buffer().snapshot().await;
    assert_eq!(recorded.len(), reports.iter().map(|r| r.recorded).sum::<usize>());
    for t in &recorded {
        assert_eq!(t.tags.source, "guided");
        assert_eq!(t.tags.vol_regime, VolatilityRegime::Low);
        assert_eq!(t.state.len(), t.next_state.len());
    }
}
