// =============================================================================
// Crypto Agent Arena — Main Entry Point
// =============================================================================
//
// Brings up the in-process engine: one scheduler task per timeframe, each
// ticking `run_pipeline` on its own cadence and, on a non-skipped run,
// driving the agent orchestrator's cycle for that timeframe directly on the
// scheduler task (no queue — the orchestrator's own per-agent boundary
// already isolates a panicking strategy, so nothing here needs to fan out
// further). Backtests are not scheduled; they are an on-demand replay
// triggered by an external collaborator, so no task owns one at startup.
// =============================================================================

use std::sync::Arc;

use aurora_arena::agent;
use aurora_arena::config::EngineConfig;
use aurora_arena::exchange::ExchangeClient;
use aurora_arena::notifier::TracingNotifier;
use aurora_arena::pipeline::run_pipeline;
use aurora_arena::portfolio::PortfolioManager;
use aurora_arena::store::Store;
use aurora_arena::types::{RunStatus, Timeframe};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Crypto Agent Arena — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    let exchange_base_url = std::env::var("ARENA_EXCHANGE_BASE_URL").unwrap_or_else(|_| config.exchange_base_url.clone());

    info!(
        exchange_base_url = %exchange_base_url,
        min_quote_volume_usd = config.min_quote_volume_usd,
        max_concurrent_positions = config.max_concurrent_positions,
        "engine configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let store = Arc::new(Store::new());
    let exchange = Arc::new(ExchangeClient::new(exchange_base_url));
    let notifier = Arc::new(TracingNotifier);
    let portfolio_manager = Arc::new(PortfolioManager::new(store.clone(), notifier));
    let config = Arc::new(config);

    // ── 3. Spawn one scheduler per timeframe ─────────────────────────────
    for timeframe in Timeframe::ALL {
        let store = store.clone();
        let exchange = exchange.clone();
        let config = config.clone();
        let portfolio_manager = portfolio_manager.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                u64::from(timeframe.cadence_minutes()) * 60,
            ));
            // The first tick fires immediately; skip it so a cold-started
            // process doesn't hit the exchange for every timeframe at once.
            interval.tick().await;

            loop {
                interval.tick().await;

                let summary = run_pipeline(&store, &exchange, &config, timeframe).await;
                match summary.status {
                    RunStatus::Completed => {
                        agent::orchestrator::run_cycle(&store, &portfolio_manager, timeframe, &summary.bars);
                    }
                    RunStatus::Skipped => {
                        info!(%timeframe, "pipeline tick skipped, orchestrator cycle not run");
                    }
                    RunStatus::Failed => {
                        error!(%timeframe, run_id = %summary.run_id, "pipeline run failed, orchestrator cycle not run");
                    }
                    RunStatus::Running => unreachable!("run_pipeline only returns a terminal status"),
                }
            }
        });
    }

    info!(count = Timeframe::ALL.len(), "timeframe schedulers launched");
    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save engine config on shutdown");
    }

    info!("Crypto Agent Arena shut down complete.");
    Ok(())
}
