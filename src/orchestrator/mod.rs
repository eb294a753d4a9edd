// Top-level trade lifecycle control loop
use crate::config::{BotConfig, CyclePolicy};
use crate::exchange::ExchangeGateway;
use crate::execution::{EntryOutcome, ExecutionGuard};
use crate::journal::Journal;
use crate::market::MarketState;
use crate::models::{ActivePosition, PositionStatus, Timeframe};
use crate::risk::RiskSizer;
use crate::signal::SignalDetector;
use crate::strategy::{ExitSignal, StrategyCore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;

/// Result of one signal-loop iteration, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// A position is live; the entry loop stays idle
    PositionLive,
    /// No setup this cycle; not an error
    NoSignal,
    /// Available equity below the risk ceiling
    BlockedEquity,
    /// Rolling Sharpe ratio below threshold
    BlockedSharpe,
    /// Sizing rejected the trade
    BlockedSizing,
    /// Limit order expired unfilled
    NoFill,
    /// Entry aborted by the micro-stop guard
    MicroStopped,
    /// Entry confirmed; monitor task spawned
    Opened,
    /// A collaborator call failed; retry after backoff
    TransientError,
}

/// Serializes signal detection, sizing, execution and monitoring, and
/// enforces the single-active-position invariant.
///
/// The position slot is effectively single-writer: the orchestrator sets it
/// exactly once per confirmed entry (before the monitor's first suspension
/// point), and only the monitor task mutates or clears it afterwards. The
/// signal loop only reads its presence to gate new entries.
pub struct TradeLifecycleOrchestrator<G: ExchangeGateway + 'static> {
    gateway: Arc<G>,
    config: BotConfig,
    market: MarketState,
    detector: SignalDetector,
    guard: ExecutionGuard,
    strategy: Arc<Mutex<StrategyCore>>,
    risk: Arc<Mutex<RiskSizer>>,
    journal: Arc<Journal>,
    position: Arc<Mutex<Option<ActivePosition>>>,
    last_1m_open_time: Option<DateTime<Utc>>,
}

impl<G: ExchangeGateway + 'static> TradeLifecycleOrchestrator<G> {
    pub fn new(gateway: Arc<G>, config: BotConfig, journal: Arc<Journal>) -> Self {
        let market = MarketState::new(config.vwap_window_secs);
        let detector = SignalDetector::new(config.signal.clone());
        let guard = ExecutionGuard::new(config.guard.clone());
        let strategy = Arc::new(Mutex::new(StrategyCore::new(config.strategy.clone())));
        let risk = Arc::new(Mutex::new(RiskSizer::new(config.risk_ceiling_usd)));

        Self {
            gateway,
            config,
            market,
            detector,
            guard,
            strategy,
            risk,
            journal,
            position: Arc::new(Mutex::new(None)),
            last_1m_open_time: None,
        }
    }

    /// Shared position slot (read-only use outside the monitor task)
    pub fn position(&self) -> Arc<Mutex<Option<ActivePosition>>> {
        self.position.clone()
    }

    pub fn strategy(&self) -> Arc<Mutex<StrategyCore>> {
        self.strategy.clone()
    }

    pub fn risk(&self) -> Arc<Mutex<RiskSizer>> {
        self.risk.clone()
    }

    /// Prime market and strategy state before the first detection cycle
    ///
    /// Leverage setup is best effort: a failure is journaled and trading
    /// continues at the exchange default.
    pub async fn warm_up(&mut self) -> crate::Result<()> {
        match self.gateway.set_leverage(self.config.leverage).await {
            Ok(()) => {
                self.journal
                    .record_event_logged(&format!("Set leverage to {}", self.config.leverage))
                    .await;
            }
            Err(e) => {
                tracing::warn!("Could not set leverage to {}: {}", self.config.leverage, e);
            }
        }

        let bars_15m = self
            .gateway
            .fetch_candles(Timeframe::FifteenMinutes, 50)
            .await?;
        for bar in bars_15m {
            self.market.push_candle(Timeframe::FifteenMinutes, bar);
        }

        let bars_1m = self.gateway.fetch_candles(Timeframe::OneMinute, 200).await?;
        for bar in bars_1m {
            self.last_1m_open_time = Some(bar.open_time);
            self.strategy.lock().unwrap().update_close(bar.close);
            self.market.push_candle(Timeframe::OneMinute, bar);
        }

        tracing::info!(
            "Warm-up complete: {} x 15m, {} x 1m candles",
            self.market.candle_count(Timeframe::FifteenMinutes),
            self.market.candle_count(Timeframe::OneMinute)
        );
        Ok(())
    }

    /// Pull the latest market data into the rolling buffers
    async fn refresh_market(&mut self) -> crate::Result<()> {
        let bars_15m = self
            .gateway
            .fetch_candles(Timeframe::FifteenMinutes, 1)
            .await?;
        if let Some(bar) = bars_15m.into_iter().last() {
            self.market.push_candle(Timeframe::FifteenMinutes, bar);
        }

        let bars_1m = self.gateway.fetch_candles(Timeframe::OneMinute, 1).await?;
        if let Some(bar) = bars_1m.into_iter().last() {
            // Feed the strategy's close buffer once per completed bar, not
            // once per poll of the still-forming bar
            if self.last_1m_open_time != Some(bar.open_time) {
                self.last_1m_open_time = Some(bar.open_time);
                self.strategy.lock().unwrap().update_close(bar.close);
            }
            self.market.push_candle(Timeframe::OneMinute, bar);
        }

        let book = self
            .gateway
            .fetch_order_book(self.config.signal.book_depth)
            .await?;
        self.market.set_order_book(book);

        let ticks = self.gateway.fetch_recent_trades(50).await?;
        for tick in ticks {
            self.market.push_tick(tick);
        }

        Ok(())
    }

    /// One iteration of the signal loop, with no sleeping; the caller paces
    /// iterations according to the cycle policy
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.position.lock().unwrap().is_some() {
            return CycleOutcome::PositionLive;
        }

        if let Err(e) = self.refresh_market().await {
            tracing::warn!("Market refresh failed: {}", e);
            return CycleOutcome::TransientError;
        }

        if let Some(z) = self.strategy.lock().unwrap().zscore() {
            tracing::debug!(zscore = z, "1m close statistics updated");
        }

        let Some(signal) = self.detector.detect(&mut self.market) else {
            return CycleOutcome::NoSignal;
        };

        let equity = match self.gateway.fetch_equity().await {
            Ok(equity) => equity,
            Err(e) => {
                tracing::warn!("Equity fetch failed: {}", e);
                return CycleOutcome::TransientError;
            }
        };

        // Liquidation safety: never start an attempt that could not absorb
        // the full risk ceiling
        if equity < self.config.risk_ceiling_usd {
            self.journal
                .record_event_logged(&format!(
                    "BLOCKED_MONEY_MANAGEMENT equity={:.2} risk_ceiling={:.2}",
                    equity, self.config.risk_ceiling_usd
                ))
                .await;
            return CycleOutcome::BlockedEquity;
        }

        if !self.strategy.lock().unwrap().allow_new_trades() {
            self.journal
                .record_event_logged("BLOCKED_SHARPE_CRITERIA")
                .await;
            return CycleOutcome::BlockedSharpe;
        }

        let decision = {
            let risk = self.risk.lock().unwrap();
            risk.size_position(equity, signal.reference_price)
        };
        let Some(decision) = decision else {
            self.journal
                .record_event_logged("BLOCKED_SIZING quantity or notional out of bounds")
                .await;
            return CycleOutcome::BlockedSizing;
        };

        let attempt = self
            .guard
            .attempt_entry(self.gateway.as_ref(), &signal, &decision)
            .await;

        match attempt {
            Err(e) => {
                tracing::warn!("Entry attempt failed: {}", e);
                CycleOutcome::TransientError
            }
            Ok(EntryOutcome::NoFill) => {
                tracing::info!("Entry order not filled, retrying from signal detection");
                CycleOutcome::NoFill
            }
            Ok(EntryOutcome::MicroStopped { exit_price, pnl_percent }) => {
                self.risk.lock().unwrap().record_outcome(pnl_percent);
                self.journal
                    .record_order_logged(
                        &self.config.symbol,
                        signal.direction,
                        signal.reference_price,
                        exit_price,
                        pnl_percent,
                    )
                    .await;
                self.journal
                    .record_event_logged(&format!(
                        "MICRO_STOP price={} pnl={:.4}",
                        exit_price, pnl_percent
                    ))
                    .await;
                CycleOutcome::MicroStopped
            }
            Ok(EntryOutcome::ConfirmedOpen { direction, entry_price, quantity }) => {
                let position = ActivePosition::new(direction, entry_price, quantity);

                // The slot must be occupied before this task reaches another
                // suspension point, so a second entry cannot start while the
                // monitor is spinning up
                *self.position.lock().unwrap() = Some(position.clone());

                self.journal
                    .record_event_logged(&format!(
                        "PLAN_{:?} price={} qty={:.6}",
                        direction, entry_price, quantity
                    ))
                    .await;

                tokio::spawn(monitor_position(
                    self.gateway.clone(),
                    self.strategy.clone(),
                    self.risk.clone(),
                    self.position.clone(),
                    self.journal.clone(),
                    self.config.symbol.clone(),
                    self.config.cycle.clone(),
                ));

                tracing::info!(
                    ?direction,
                    entry_price,
                    quantity,
                    "Position opened, monitor started"
                );
                CycleOutcome::Opened
            }
        }
    }

    /// Main loop: run cycles paced by the policy until shutdown (or until
    /// `max_cycles` in bounded mode)
    pub async fn run(&mut self) {
        let policy = self.config.cycle.clone();
        let mut cycles = 0u32;

        loop {
            let outcome = self.run_cycle().await;
            tracing::debug!(?outcome, "cycle complete");

            let delay = match outcome {
                CycleOutcome::TransientError => policy.error_backoff,
                _ => policy.signal_poll,
            };

            cycles += 1;
            if let Some(max) = policy.max_cycles {
                if cycles >= max {
                    tracing::info!("Cycle budget exhausted, stopping signal loop");
                    return;
                }
            }

            sleep(delay).await;
        }
    }
}

/// Concurrent position monitor
///
/// Owns the position slot exclusively once spawned: polls the adaptive exit
/// rule, closes at market on `ExitNow`, records the outcome into both trailing
/// histories and clears the slot, unblocking the next signal cycle.
async fn monitor_position<G: ExchangeGateway + 'static>(
    gateway: Arc<G>,
    strategy: Arc<Mutex<StrategyCore>>,
    risk: Arc<Mutex<RiskSizer>>,
    position: Arc<Mutex<Option<ActivePosition>>>,
    journal: Arc<Journal>,
    symbol: String,
    policy: CyclePolicy,
) {
    let mut tightened = false;

    loop {
        let Some(pos) = position.lock().unwrap().clone() else {
            return;
        };

        let candles = match gateway.fetch_candles(Timeframe::OneMinute, 50).await {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!("Monitor candle fetch failed: {}", e);
                sleep(policy.error_backoff).await;
                continue;
            }
        };
        let mark = match gateway.fetch_mark_price().await {
            Ok(mark) => mark,
            Err(e) => {
                tracing::warn!("Monitor mark price fetch failed: {}", e);
                sleep(policy.error_backoff).await;
                continue;
            }
        };

        let verdict = {
            let strategy = strategy.lock().unwrap();
            match strategy.atr(&candles) {
                Some(atr) => strategy.adaptive_exit(pos.direction, pos.entry_price, mark, atr),
                None => ExitSignal::Hold,
            }
        };

        match verdict {
            ExitSignal::ExitNow => {
                if let Some(p) = position.lock().unwrap().as_mut() {
                    p.status = PositionStatus::Closing;
                }
                close_position(&*gateway, &strategy, &risk, &position, &journal, &symbol, &pos, mark, &policy)
                    .await;
                return;
            }
            ExitSignal::Retracement => {
                if !tightened {
                    tracing::info!(mark, "Protective retracement, tightening monitor cadence");
                    tightened = true;
                }
            }
            ExitSignal::Hold => {
                tightened = false;
            }
        }

        let delay = if tightened {
            policy.monitor_poll_tight
        } else {
            policy.monitor_poll
        };
        sleep(delay).await;
    }
}

/// Issue the closing market order, retrying on transient failures, then
/// record the outcome and clear the position slot
#[allow(clippy::too_many_arguments)]
async fn close_position<G: ExchangeGateway>(
    gateway: &G,
    strategy: &Arc<Mutex<StrategyCore>>,
    risk: &Arc<Mutex<RiskSizer>>,
    position: &Arc<Mutex<Option<ActivePosition>>>,
    journal: &Arc<Journal>,
    symbol: &str,
    pos: &ActivePosition,
    mark: f64,
    policy: &CyclePolicy,
) {
    loop {
        match gateway
            .place_market_order(pos.direction.exit_side(), pos.quantity)
            .await
        {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!("Closing order failed, retrying: {}", e);
                sleep(policy.error_backoff).await;
            }
        }
    }

    let pnl_percent = pos.direction.pnl_percent(pos.entry_price, mark);
    strategy.lock().unwrap().record_outcome(pnl_percent);
    risk.lock().unwrap().record_outcome(pnl_percent);

    journal
        .record_order_logged(symbol, pos.direction, pos.entry_price, mark, pnl_percent)
        .await;
    journal
        .record_event_logged(&format!(
            "EXIT_AT_MARKET {:?} price={} pnl={:.4}",
            pos.direction.exit_side(),
            mark,
            pnl_percent
        ))
        .await;

    *position.lock().unwrap() = None;
    tracing::info!(mark, pnl_percent, "Position closed");
}
