use clap::Parser;
use scalpbot::config::BotConfig;
use scalpbot::exchange::BinanceFuturesClient;
use scalpbot::journal::Journal;
use scalpbot::orchestrator::TradeLifecycleOrchestrator;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "scalpbot", about = "Single-instrument futures scalping bot")]
struct Cli {
    /// Trading symbol, overrides the SYMBOL environment variable
    #[arg(long)]
    symbol: Option<String>,

    /// Journal database path, overrides JOURNAL_PATH
    #[arg(long)]
    journal: Option<String>,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scalpbot=info".into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    // Missing credentials are fatal; the process must not begin trading
    let mut config = BotConfig::from_env()?;
    if let Some(symbol) = cli.symbol {
        config.symbol = symbol;
    }
    if let Some(journal) = cli.journal {
        config.journal_path = journal;
    }

    tracing::info!("Scalpbot starting");
    tracing::info!("  Symbol: {}", config.symbol);
    tracing::info!("  Risk ceiling: ${:.2}", config.risk_ceiling_usd);
    tracing::info!(
        "  Entry band: {:.2} - {:.2}",
        config.signal.entry_band_low,
        config.signal.entry_band_high
    );

    let gateway = Arc::new(BinanceFuturesClient::new(
        config.symbol.clone(),
        config.api_key.clone(),
        config.api_secret.clone(),
    ));
    let journal = Arc::new(Journal::open(&config.journal_path).await.map_err(
        |e| anyhow::anyhow!("failed to open journal: {}", e),
    )?);

    let mut orchestrator =
        TradeLifecycleOrchestrator::new(gateway, config, journal.clone());

    if let Err(e) = orchestrator.warm_up().await {
        tracing::warn!("Warm-up incomplete ({}), buffers will fill from live polling", e);
    }

    tokio::select! {
        _ = orchestrator.run() => {
            tracing::info!("Signal loop exited");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
    }

    journal.close().await;
    tracing::info!("Scalpbot stopped");
    Ok(())
}
