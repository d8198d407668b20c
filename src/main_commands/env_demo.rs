use rand::Rng;
use tracing::info;
use tradeloop::config::AppConfig;
use tradeloop::error::Result;
use tradeloop::rl::{
    DiscreteAction, Environment, MarketConfig, SimulatedMarket, TradingEnvironment,
};
use tradeloop::strategy::seeded_rng;

/// Roll a uniformly random policy through freshly generated markets
pub(crate) fn run_env_demo(
    config: &AppConfig,
    episodes: usize,
    steps: usize,
    volatility: f64,
    seed: Option<u64>,
    verbose: bool,
) -> Result<()> {
    let seed = seed.or(config.simulation.seed).unwrap_or_else(rand::random);
    let mut policy_rng = seeded_rng(Some(seed.wrapping_add(1)));
    let mut market = SimulatedMarket::new(
        MarketConfig {
            volatility,
            ..Default::default()
        },
        seed,
    );

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Trading Environment Demo                       ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Episodes:       {:>10}                                    ║", episodes);
    println!("║  Bars:           {:>10}                                    ║", steps);
    println!("║  Volatility:     {:>10.4}                                    ║", volatility);
    println!("║  Seed:           {:>10}                                    ║", seed);
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let series = market.generate_series(steps)?;
    let mut env = TradingEnvironment::new(config.environment.clone(), series)?;
    let mut total_returns = Vec::with_capacity(episodes);

    for episode in 0..episodes {
        if episode > 0 {
            env.load_series(market.generate_series(steps)?);
        }
        let observation = env.reset()?;
        info!(episode, dim = observation.len(), "episode started");

        let mut episode_reward = 0.0;
        loop {
            let action = DiscreteAction::from(policy_rng.gen_range(0..env.action_dim()));
            let result = env.step(action)?;
            debug_assert_eq!(result.observation.len(), env.observation_dim());
            episode_reward += result.reward;

            if verbose {
                println!(
                    "  [{:>4}] {:<4} price={:>9.4} pos={:>2} cash={:.4} reward={:+.5}{}",
                    result.info.index,
                    format!("{:?}", action),
                    result.info.price,
                    result.info.position,
                    result.info.cash,
                    result.reward,
                    if result.truncated { " (forced close)" } else { "" }
                );
            }
            if result.done {
                break;
            }
        }

        let total_return = env.cash() / config.environment.initial_cash - 1.0;
        total_returns.push(total_return);
        println!(
            "Episode {:>3}: steps={:<5} trades={:<4} win_rate={:>5.1}% return={:>+8.3}% \
             reward={:+.4}",
            episode + 1,
            env.step_count(),
            env.num_trades(),
            env.win_rate() * 100.0,
            total_return * 100.0,
            episode_reward
        );
    }

    if !total_returns.is_empty() {
        let mean = total_returns.iter().sum::<f64>() / total_returns.len() as f64;
        println!("\nMean return over {} episodes: {:+.3}%", total_returns.len(), mean * 100.0);
    }
    Ok(())
}
