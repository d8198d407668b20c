use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tradeloop::adapters::{BarProvider, PostgresStore, SyntheticBarProvider};
use tradeloop::config::AppConfig;
use tradeloop::coordinator::{DayReport, LearningLoop};
use tradeloop::error::{Result, TradeloopError};
use tradeloop::persistence::TransitionStore;
use tradeloop::rl::{BufferMetrics, RewardAttributor};
use tradeloop::services::{CachedFeatureProvider, EventBus, FeedbackCollector, TradingEvent};
use tradeloop::strategy::{ExecutionSimulator, RealizedVolClassifier, RegimeClassifier};

use super::{build_buffer, build_controller, component_rng, memory_store};

pub(crate) struct SimulateOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub hydrate: bool,
    pub json: bool,
    pub events: Option<String>,
}

pub(crate) async fn run_simulate(config: AppConfig, options: SimulateOptions) -> Result<()> {
    if options.end < options.start {
        return Err(TradeloopError::InvalidConfig(format!(
            "end {} before start {}",
            options.end, options.start
        )));
    }

    let store = open_store(&config).await?;
    let buffer = build_buffer(&config, store);
    if options.hydrate {
        let loaded = buffer.hydrate().await?;
        info!(loaded, "replay buffer hydrated");
    }

    let controller = build_controller(&config, Arc::clone(&buffer), None)?;
    let phase_rx = controller.subscribe();

    let bars: Arc<dyn BarProvider> = Arc::new(
        SyntheticBarProvider::new(config.simulation.bars_seed)
            .with_volatility(config.simulation.bars_volatility),
    );
    let features = Arc::new(CachedFeatureProvider::new(
        config.features.clone(),
        Arc::clone(&bars),
    ));
    let regime: Arc<dyn RegimeClassifier> = Arc::new(RealizedVolClassifier::new(
        config.regime.clone(),
        Arc::clone(&bars),
    ));
    let attributor = RewardAttributor::new(config.reward.clone());
    let simulator = ExecutionSimulator::new(
        config.execution.clone(),
        Arc::clone(&bars),
        attributor.clone(),
        component_rng(&config, 3),
    );

    // Real trade feedback runs beside the daily sweep
    let bus = EventBus::new(config.simulation.event_capacity);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let collector = FeedbackCollector::new(Arc::clone(&buffer), attributor, phase_rx)
        .with_features(features.clone())
        .with_regime(Arc::clone(&regime));
    let collector_handle = collector.spawn(&bus, shutdown_tx.subscribe());

    if let Some(path) = &options.events {
        let published = publish_event_file(&bus, path).await?;
        info!(published, path = %path, "trade events published");
    }

    let mut sweep = LearningLoop::new(
        config.universe.clone(),
        controller,
        features,
        config.features.timeout(),
        regime,
        simulator,
    );

    print_banner(&config, &options);
    let reports = sweep.run(options.start, options.end).await;

    // The collector drains queued events before it stops
    let _ = shutdown_tx.send(());
    let feedback_recorded = match collector_handle.await {
        Ok(recorded) => recorded,
        Err(e) => {
            warn!(error = %e, "feedback collector task failed");
            0
        }
    };

    let reports = reports?;
    if options.json {
        for report in &reports {
            println!("{}", serde_json::to_string(report)?);
        }
    } else {
        for report in &reports {
            print_day(report);
        }
    }

    let metrics = sweep.metrics().await;
    if options.json {
        println!("{}", serde_json::to_string(&metrics)?);
    } else {
        print_summary(&reports, &metrics, feedback_recorded);
    }
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn TransitionStore>> {
    match &config.database {
        Some(db) => {
            let store = PostgresStore::new(&db.url, db.max_connections).await?;
            if db.migrate {
                store.migrate().await?;
            }
            info!("using PostgreSQL transition store");
            Ok(Arc::new(store))
        }
        None => {
            info!("using in-memory transition store");
            Ok(memory_store())
        }
    }
}

/// Publish every event in a JSON-lines file, waiting on a full bus.
/// Blank lines are skipped.
async fn publish_event_file(bus: &EventBus, path: &str) -> Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let mut published = 0;
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match TradingEvent::from_json(line) {
            Ok(event) => {
                bus.publish(event).await;
                published += 1;
            }
            Err(e) => warn!(line = line_no + 1, error = %e, "skipping malformed event"),
        }
    }
    Ok(published)
}

fn print_banner(config: &AppConfig, options: &SimulateOptions) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               tradeloop Simulation                           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Start:          {:>12}                                ║", options.start);
    println!("║  End:            {:>12}                                ║", options.end);
    println!(
        "║  Symbols:        {:>12}                                ║",
        config.universe.symbols.len()
    );
    println!(
        "║  Initial phase:  {:>12}                                ║",
        config.phase.initial_phase
    );
    match config.simulation.seed {
        Some(seed) => println!("║  Seed:           {:>12}                                ║", seed),
        None => println!("║  Seed:           {:>12}                                ║", "entropy"),
    }
    println!("╚══════════════════════════════════════════════════════════════╝\n");
}

fn print_day(report: &DayReport) {
    println!(
        "{}  {:<10} {:<10} eps={:.2}  cand={:<3} skip={:<2} trades={:<3} fills={:<3} \
         recorded={:<3} mean={:+.4}",
        report.date,
        report.phase_after.to_string(),
        report.regime.to_string(),
        report.epsilon,
        report.candidates,
        report.skipped.len(),
        report.trades,
        report.fills,
        report.recorded,
        report.mean_reward,
    );
    if report.phase_after != report.phase_before {
        println!("  phase {} -> {}", report.phase_before, report.phase_after);
    }
}

fn print_summary(reports: &[DayReport], metrics: &BufferMetrics, feedback_recorded: u64) {
    let failed: usize = reports.iter().map(|r| r.failed_appends).sum();
    let final_phase = reports
        .last()
        .map(|r| r.phase_after.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║               Simulation Summary                             ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Days:            {:>10}                                   ║", reports.len());
    println!("║  Final phase:     {:>10}                                   ║", final_phase);
    println!(
        "║  Transitions:     {:>10}                                   ║",
        metrics.transitions
    );
    println!(
        "║  Real trades:     {:>10}                                   ║",
        metrics.real_trades
    );
    println!(
        "║  Feedback closes: {:>10}                                   ║",
        feedback_recorded
    );
    println!("║  Failed appends:  {:>10}                                   ║", failed);
    println!(
        "║  Converged:       {:>10}                                   ║",
        metrics.converged
    );
    println!(
        "║  Coverage:        {:>9.1}%                                   ║",
        metrics.coverage
    );
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (phase, stats) in &metrics.rewards_by_phase {
        println!(
            "║  {:<10} n={:<6} mean={:>+9.4} total={:>+10.4}         ║",
            phase.to_string(),
            stats.count,
            stats.mean,
            stats.total
        );
    }
    for (regime, sharpe) in &metrics.sharpe_by_regime {
        println!(
            "║  sharpe {:<8} {:>+9.4}                                     ║",
            regime.to_string(),
            sharpe
        );
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
}
