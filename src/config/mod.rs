// Startup configuration from environment variables
use crate::execution::GuardConfig;
use crate::signal::SignalConfig;
use crate::strategy::StrategyConfig;
use anyhow::Context;
use std::time::Duration;

/// Loop timing and retry policy for the orchestrator
///
/// `max_cycles` bounds the signal loop so tests can run it to completion;
/// production passes None and loops until shutdown.
#[derive(Debug, Clone)]
pub struct CyclePolicy {
    pub signal_poll: Duration,
    pub monitor_poll: Duration,
    /// Tightened monitor cadence while a protective retracement is active
    pub monitor_poll_tight: Duration,
    pub error_backoff: Duration,
    pub max_cycles: Option<u32>,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            signal_poll: Duration::from_secs(15),
            monitor_poll: Duration::from_secs(5),
            monitor_poll_tight: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            max_cycles: None,
        }
    }
}

/// Static configuration supplied at startup; no hot reload
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub symbol: String,
    pub api_key: String,
    pub api_secret: String,
    pub leverage: u32,
    pub risk_ceiling_usd: f64,
    pub journal_path: String,
    pub vwap_window_secs: i64,
    pub signal: SignalConfig,
    pub strategy: StrategyConfig,
    pub guard: GuardConfig,
    pub cycle: CyclePolicy,
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

impl BotConfig {
    /// Load configuration from the environment
    ///
    /// Missing API credentials are the only fatal condition; every other
    /// setting has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("BINANCE_API_KEY")
            .context("BINANCE_API_KEY not set in environment or .env file")?;
        let api_secret = std::env::var("BINANCE_SECRET_KEY")
            .context("BINANCE_SECRET_KEY not set in environment or .env file")?;

        let symbol = std::env::var("SYMBOL").unwrap_or_else(|_| "ETHUSDT".to_string());
        let journal_path =
            std::env::var("JOURNAL_PATH").unwrap_or_else(|_| "trading_bot.db".to_string());

        let leverage = std::env::var("LEVERAGE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let signal = SignalConfig {
            entry_band_low: env_f64("ENTRY_BAND_LOW", 2645.0),
            entry_band_high: env_f64("ENTRY_BAND_HIGH", 2660.0),
            ..SignalConfig::default()
        };

        let strategy = StrategyConfig {
            sharpe_threshold: env_f64("SHARPE_THRESHOLD", 0.5),
            ..StrategyConfig::default()
        };

        let guard = GuardConfig {
            max_adverse_move: env_f64("MICRO_STOP_PCT", 0.003),
            ..GuardConfig::default()
        };

        Ok(Self {
            symbol,
            api_key,
            api_secret,
            leverage,
            risk_ceiling_usd: env_f64("MAX_RISK_USD", 100.0),
            journal_path,
            vwap_window_secs: 60,
            signal,
            strategy,
            guard,
            cycle: CyclePolicy::default(),
        })
    }
}
