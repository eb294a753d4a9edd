// Order entry with a bounded fill window and a post-fill micro-stop guard
use crate::exchange::{ExchangeGateway, OrderStatus};
use crate::models::{Direction, RiskDecision, TradeSignal};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Terminal state of a single entry attempt
///
/// PLACED -> FILLED -> {MICRO_STOPPED | CONFIRMED_OPEN}
/// PLACED -> CANCELLED (fill timeout)
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Order not filled within the fill timeout; cancelled, no retry here
    NoFill,
    /// Price moved adversely past the threshold right after the fill;
    /// position flattened at market with a small realized loss
    MicroStopped { exit_price: f64, pnl_percent: f64 },
    /// Guard window elapsed without breach; the position is now live
    ConfirmedOpen {
        direction: Direction,
        entry_price: f64,
        quantity: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// How long to wait for the post-only limit order to fill
    pub fill_timeout: Duration,
    /// Mark price poll interval inside the micro-stop window
    pub poll_interval: Duration,
    /// Length of the micro-stop window after a fill
    pub guard_window: Duration,
    /// Adverse move fraction that triggers the micro-stop (0.003 = 0.3%)
    pub max_adverse_move: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            fill_timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(10),
            guard_window: Duration::from_millis(500),
            max_adverse_move: 0.003,
        }
    }
}

/// Places a bounded-lifetime limit order and babysits the instant after the
/// fill, when slippage risk is highest. Bounds worst-case loss on every entry
/// attempt independently of the strategy's exit rule.
pub struct ExecutionGuard {
    config: GuardConfig,
}

impl ExecutionGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Run one entry attempt to its terminal state
    ///
    /// Gateway errors before the fill propagate to the caller, which treats
    /// them as a failed cycle and retries with backoff. After the fill the
    /// attempt always resolves to a terminal outcome: a filled position is
    /// never dropped on an error.
    pub async fn attempt_entry<G: ExchangeGateway + ?Sized>(
        &self,
        gateway: &G,
        signal: &TradeSignal,
        decision: &RiskDecision,
    ) -> Result<EntryOutcome> {
        let side = signal.direction.entry_side();
        let ack = gateway
            .place_limit_order(side, signal.reference_price, decision.quantity)
            .await?;

        tracing::debug!(
            order_id = %ack.order_id,
            price = signal.reference_price,
            quantity = decision.quantity,
            "entry order placed"
        );

        let status = if ack.status == OrderStatus::Filled {
            OrderStatus::Filled
        } else {
            sleep(self.config.fill_timeout).await;
            gateway.fetch_order_status(&ack.order_id).await?
        };

        if status != OrderStatus::Filled {
            gateway.cancel_order(&ack.order_id).await?;
            tracing::debug!(order_id = %ack.order_id, "no fill within timeout, cancelled");
            return Ok(EntryOutcome::NoFill);
        }

        Ok(self
            .run_micro_stop(gateway, signal.direction, signal.reference_price, decision.quantity)
            .await)
    }

    /// Poll the mark price for the guard window; flatten on adverse breach
    ///
    /// The order is filled at this point, so gateway failures never escape:
    /// mark-price errors are retried within the window, and a failed flatten
    /// falls through to `ConfirmedOpen` so the monitor owns the exit.
    async fn run_micro_stop<G: ExchangeGateway + ?Sized>(
        &self,
        gateway: &G,
        direction: Direction,
        entry_price: f64,
        quantity: f64,
    ) -> EntryOutcome {
        let started = Instant::now();

        loop {
            let mark = match gateway.fetch_mark_price().await {
                Ok(mark) => mark,
                Err(e) => {
                    tracing::warn!("Mark price poll failed inside guard window: {}", e);
                    if started.elapsed() >= self.config.guard_window {
                        break;
                    }
                    sleep(self.config.poll_interval).await;
                    continue;
                }
            };

            // Positive when price moves against the position
            let adverse_move = match direction {
                Direction::Long => (entry_price - mark) / entry_price,
                Direction::Short => (mark - entry_price) / entry_price,
            };

            if adverse_move >= self.config.max_adverse_move {
                if let Err(e) = gateway
                    .place_market_order(direction.exit_side(), quantity)
                    .await
                {
                    tracing::warn!("Micro-stop flatten failed, handing exit to the monitor: {}", e);
                    break;
                }
                let pnl_percent = direction.pnl_percent(entry_price, mark);
                tracing::info!(mark, pnl_percent, "micro-stop triggered, position flattened");
                return EntryOutcome::MicroStopped {
                    exit_price: mark,
                    pnl_percent,
                };
            }

            if started.elapsed() >= self.config.guard_window {
                break;
            }
            sleep(self.config.poll_interval).await;
        }

        EntryOutcome::ConfirmedOpen {
            direction,
            entry_price,
            quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderAck;
    use crate::models::{Candle, OrderBookSnapshot, OrderSide, Tick, Timeframe};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Gateway whose ack status, fill status and mark prices are scripted
    struct ScriptedGateway {
        ack_status: OrderStatus,
        fill_status: OrderStatus,
        marks: Mutex<Vec<f64>>,
        cancels: AtomicUsize,
        flatten_orders: Mutex<Vec<(OrderSide, f64)>>,
        fail_mark_price: bool,
        fail_flatten: bool,
    }

    impl ScriptedGateway {
        fn new(fill_status: OrderStatus, marks: Vec<f64>) -> Self {
            Self {
                ack_status: OrderStatus::New,
                fill_status,
                marks: Mutex::new(marks),
                cancels: AtomicUsize::new(0),
                flatten_orders: Mutex::new(Vec::new()),
                fail_mark_price: false,
                fail_flatten: false,
            }
        }

        fn next_mark(&self) -> f64 {
            let mut marks = self.marks.lock().unwrap();
            if marks.len() > 1 {
                marks.remove(0)
            } else {
                marks[0]
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for ScriptedGateway {
        async fn fetch_candles(&self, _: Timeframe, _: usize) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
        async fn fetch_order_book(&self, _: usize) -> Result<OrderBookSnapshot> {
            Ok(OrderBookSnapshot::default())
        }
        async fn fetch_recent_trades(&self, _: usize) -> Result<Vec<Tick>> {
            Ok(Vec::new())
        }
        async fn fetch_mark_price(&self) -> Result<f64> {
            if self.fail_mark_price {
                return Err("mark price unavailable".into());
            }
            Ok(self.next_mark())
        }
        async fn fetch_equity(&self) -> Result<f64> {
            Ok(10_000.0)
        }
        async fn place_limit_order(&self, _: OrderSide, _: f64, _: f64) -> Result<OrderAck> {
            Ok(OrderAck {
                order_id: "order-1".to_string(),
                status: self.ack_status,
            })
        }
        async fn place_market_order(&self, side: OrderSide, quantity: f64) -> Result<()> {
            if self.fail_flatten {
                return Err("order rejected".into());
            }
            self.flatten_orders.lock().unwrap().push((side, quantity));
            Ok(())
        }
        async fn cancel_order(&self, _: &str) -> Result<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn fetch_order_status(&self, _: &str) -> Result<OrderStatus> {
            Ok(self.fill_status)
        }
        async fn set_leverage(&self, _: u32) -> Result<()> {
            Ok(())
        }
    }

    fn short_signal() -> TradeSignal {
        TradeSignal {
            direction: Direction::Short,
            reference_price: 2590.0,
        }
    }

    fn long_signal() -> TradeSignal {
        TradeSignal {
            direction: Direction::Long,
            reference_price: 2590.0,
        }
    }

    fn decision() -> RiskDecision {
        RiskDecision {
            notional_usd: 100.0,
            quantity: 100.0 / 2590.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fill_cancels_and_reports() {
        let gateway = ScriptedGateway::new(OrderStatus::New, vec![2590.0]);
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &short_signal(), &decision())
            .await
            .unwrap();

        assert_eq!(outcome, EntryOutcome::NoFill);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);
        assert!(gateway.flatten_orders.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_micro_stop_on_adverse_move() {
        // Long entry at 2590; mark drops to 2582.2, a -0.301% move
        let gateway =
            ScriptedGateway::new(OrderStatus::Filled, vec![2590.0, 2588.0, 2582.2]);
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &long_signal(), &decision())
            .await
            .unwrap();

        match outcome {
            EntryOutcome::MicroStopped { exit_price, pnl_percent } => {
                assert_eq!(exit_price, 2582.2);
                assert!(pnl_percent < 0.0);
            }
            other => panic!("expected MicroStopped, got {:?}", other),
        }

        // Flattened with the opposite side
        let flattens = gateway.flatten_orders.lock().unwrap();
        assert_eq!(flattens.len(), 1);
        assert_eq!(flattens[0].0, OrderSide::Sell);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_open_when_guard_window_survives() {
        // Mark holds at 2588, only -0.077% adverse for a long at 2590
        let gateway = ScriptedGateway::new(OrderStatus::Filled, vec![2588.0]);
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &long_signal(), &decision())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EntryOutcome::ConfirmedOpen {
                direction: Direction::Long,
                entry_price: 2590.0,
                quantity: 100.0 / 2590.0,
            }
        );
        assert!(gateway.flatten_orders.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_micro_stop_short_mirror() {
        // Short entry at 2590; mark rising to 2598 is a +0.309% adverse move
        let gateway = ScriptedGateway::new(OrderStatus::Filled, vec![2591.0, 2598.0]);
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &short_signal(), &decision())
            .await
            .unwrap();

        match outcome {
            EntryOutcome::MicroStopped { pnl_percent, .. } => assert!(pnl_percent < 0.0),
            other => panic!("expected MicroStopped, got {:?}", other),
        }
        assert_eq!(
            gateway.flatten_orders.lock().unwrap()[0].0,
            OrderSide::Buy
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_poll_failure_does_not_abandon_fill() {
        // Every mark price poll after the fill errors; the attempt must still
        // resolve to an open position instead of surfacing the error
        let mut gateway = ScriptedGateway::new(OrderStatus::Filled, vec![2590.0]);
        gateway.fail_mark_price = true;
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &long_signal(), &decision())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EntryOutcome::ConfirmedOpen {
                direction: Direction::Long,
                entry_price: 2590.0,
                quantity: 100.0 / 2590.0,
            }
        );
        assert!(gateway.flatten_orders.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flatten_failure_reports_open_position() {
        // Adverse breach but the flatten order is rejected: the position is
        // reported as open so the monitor takes over the exit
        let mut gateway = ScriptedGateway::new(OrderStatus::Filled, vec![2582.2]);
        gateway.fail_flatten = true;
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &long_signal(), &decision())
            .await
            .unwrap();

        assert!(matches!(outcome, EntryOutcome::ConfirmedOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_fill_skips_status_poll() {
        // Ack already FILLED: fetch_order_status (scripted to Canceled) must
        // never be consulted, so the attempt proceeds into the guard window
        let mut gateway = ScriptedGateway::new(OrderStatus::Canceled, vec![2590.0]);
        gateway.ack_status = OrderStatus::Filled;
        let guard = ExecutionGuard::new(GuardConfig::default());

        let outcome = guard
            .attempt_entry(&gateway, &long_signal(), &decision())
            .await
            .unwrap();

        assert!(matches!(outcome, EntryOutcome::ConfirmedOpen { .. }));
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 0);
    }
}
