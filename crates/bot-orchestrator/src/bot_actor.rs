//! The paper-trading control loop.
//!
//! One actor per desk. Each tick runs, in order: disabled check, spot fetch,
//! exit management for every open position, cooldown and auto-entry gates,
//! combined wall computation, touch detection, risk gate and entry. Every
//! step is fail-soft: a failure ends the tick with a [`BlockReason`] and the
//! next tick starts from scratch.

use crate::commands::{BotCommand, BotStatus, LoopState};
use crate::events::{BlockReason, EntryRecord, ExitRecord, TickOutcome, TickReport};
use crate::state::DeskState;
use chrono::{DateTime, Utc};
use futures::future::try_join;
use gex_desk_core::{BotConfig, DeskError, LegQuote};
use gex_desk_gex::{ExpiryMode, Wall, WallQuery};
use gex_desk_paper::{
    check_exit_rules, check_risk, entry_costs, open_risk_usd, resolve_quantity, value_of,
    ExitFill, ExitRules, ExitSignal, MarketKey, OpenRequest, PositionSource, PricingBasis,
    RiskCheck, RiskLimits,
};
use rust_decimal::prelude::ToPrimitive;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Touch tolerance: `max(1, spot * 5e-5)`.
const TOUCH_EPS_FRACTION: f64 = 5e-5;
const TOUCH_EPS_MIN: f64 = 1.0;

/// A tick ended before entering.
#[derive(Debug)]
struct Block {
    reason: BlockReason,
    detail: String,
}

impl Block {
    fn new(reason: BlockReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(BlockReason::Cancelled, "shutdown requested")
    }
}

enum Interrupt {
    Cancelled,
    Failed(DeskError),
}

pub struct BotActor {
    state: Arc<DeskState>,
    rx: mpsc::Receiver<BotCommand>,
    status_tx: watch::Sender<BotStatus>,
    cancel: CancellationToken,
    ticks: u64,
    last_error: Option<String>,
    last_entry_id: Option<String>,
    last_block: Option<BlockReason>,
    last_tick_at: Option<DateTime<Utc>>,
}

impl BotActor {
    #[must_use]
    pub fn new(
        state: Arc<DeskState>,
        rx: mpsc::Receiver<BotCommand>,
        status_tx: watch::Sender<BotStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            rx,
            status_tx,
            cancel,
            ticks: 0,
            last_error: None,
            last_entry_id: None,
            last_block: None,
            last_tick_at: None,
        }
    }

    /// Runs until cancelled or told to shut down.
    pub async fn run(mut self) {
        let period = self.state.settings.tick_interval;
        tracing::info!(interval_ms = period.as_millis() as u64, "Control loop starting");
        self.publish_status(LoopState::Running);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(BotCommand::TickNow(reply)) => {
                        let report = self.tick().await;
                        let _ = reply.send(report);
                    }
                    Some(BotCommand::GetStatus(reply)) => {
                        let _ = reply.send(self.status_tx.borrow().clone());
                    }
                    Some(BotCommand::Shutdown) | None => break,
                },
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        self.publish_status(LoopState::Stopped);
        tracing::info!(ticks = self.ticks, "Control loop stopped");
    }

    /// Runs one tick, records it in the audit and publishes status.
    pub async fn tick(&mut self) -> TickReport {
        let report = self.evaluate(Utc::now()).await;

        self.ticks += 1;
        self.last_tick_at = Some(report.at);
        match &report.outcome {
            TickOutcome::Entered(entry) => {
                self.last_entry_id = Some(entry.position_id.clone());
                self.last_block = None;
            }
            TickOutcome::Blocked { reason, detail } => {
                self.last_block = Some(*reason);
                if *reason == BlockReason::Error {
                    self.last_error = Some(detail.clone());
                    tracing::warn!(detail = %detail, "Tick failed");
                } else {
                    tracing::debug!(reason = %reason, detail = %detail, "Tick blocked");
                }
            }
        }

        self.state.audit.record(report.clone());
        let state = if self.cancel.is_cancelled() {
            LoopState::Stopped
        } else {
            LoopState::Running
        };
        self.publish_status(state);
        report
    }

    async fn evaluate(&self, now: DateTime<Utc>) -> TickReport {
        let config = self.state.bot_config();
        let mut report = TickReport {
            at: now,
            currency: config.currency.clone(),
            spot: None,
            exits: Vec::new(),
            exit_errors: Vec::new(),
            outcome: TickOutcome::Blocked {
                reason: BlockReason::Disabled,
                detail: String::new(),
            },
        };

        report.outcome = match self.decide(&config, now, &mut report).await {
            Ok(entry) => TickOutcome::Entered(entry),
            Err(block) => TickOutcome::Blocked {
                reason: block.reason,
                detail: block.detail,
            },
        };
        report
    }

    async fn decide(
        &self,
        config: &BotConfig,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<EntryRecord, Block> {
        if !config.enabled {
            return Err(Block::new(BlockReason::Disabled, "bot disabled"));
        }

        let prev_spot = config.last_spot;
        let spot = match self
            .call(self.state.market.get_spot(&config.currency, config.spot_source))
            .await
        {
            Ok(spot) if spot.is_finite() && spot > 0.0 => spot,
            Ok(spot) => return Err(Block::new(BlockReason::NoSpot, format!("invalid spot {spot}"))),
            Err(Interrupt::Cancelled) => return Err(Block::cancelled()),
            Err(Interrupt::Failed(e)) => return Err(Block::new(BlockReason::NoSpot, e.to_string())),
        };
        report.spot = Some(spot);
        self.state.record_spot(spot);

        self.manage_exits(config, spot, report).await?;

        let now_ms = now.timestamp_millis();
        if !config.can_act(now_ms) {
            return Err(Block::new(
                BlockReason::Cooldown,
                format!("{} ms remaining", config.cooldown_remaining_ms(now_ms)),
            ));
        }
        if !config.auto_entry {
            return Err(Block::new(BlockReason::AutoEntryOff, "auto entry disarmed"));
        }
        if config.expiries.is_empty() {
            return Err(Block::new(BlockReason::NoExpiries, "no expiries configured"));
        }

        let query = WallQuery {
            currency: config.currency.clone(),
            expiries: ExpiryMode::Explicit {
                codes: config.expiries.clone(),
            },
            strike_range_pct: config.strike_range_pct,
            walls_n: config.walls_n,
        };
        let combined = match self.guard(self.state.combiner.combine(&query)).await {
            Ok(combined) => combined,
            Err(Interrupt::Cancelled) => return Err(Block::cancelled()),
            Err(Interrupt::Failed(DeskError::InvalidRequest(msg))) => {
                return Err(Block::new(BlockReason::NoExpiries, msg))
            }
            Err(Interrupt::Failed(e)) => return Err(Block::new(BlockReason::Error, e.to_string())),
        };
        if combined.walls.is_empty() {
            return Err(Block::new(BlockReason::NoWalls, "combined profile has no walls"));
        }

        let Some(wall) = touched_wall(&combined.walls, prev_spot, spot) else {
            return Err(Block::new(
                BlockReason::NoTouch,
                format!("spot {spot:.2} not at any of {} walls", combined.walls.len()),
            ));
        };

        let open = self.state.ledger.list_open();
        let limits = RiskLimits {
            max_positions: config.max_positions,
            max_risk_usd: config.max_risk_usd,
        };
        if open.len() >= limits.max_positions {
            return Err(Block::new(
                BlockReason::MaxPositions,
                format!("{} open, max {}", open.len(), limits.max_positions),
            ));
        }
        let open_risk = open_risk_usd(&open);
        if open_risk >= limits.max_risk_usd {
            return Err(Block::new(
                BlockReason::MaxRisk,
                format!("open risk {open_risk} >= {}", limits.max_risk_usd),
            ));
        }

        let legs = combined.legs_at(wall.strike);
        if legs.is_empty() {
            return Err(Block::new(
                BlockReason::NoChainRow,
                format!("no call/put pair at {}", wall.strike),
            ));
        }
        let Some(leg) = legs.iter().find(|l| {
            let key = MarketKey::new(&config.currency, l.expiry, wall.strike);
            !open.iter().any(|p| p.key() == key)
        }) else {
            return Err(Block::new(
                BlockReason::DuplicateStrike,
                format!("already open at {} in every combined expiry", wall.strike),
            ));
        };

        let call = LegQuote::from(leg.call);
        let put = LegQuote::from(leg.put);
        if call.ask_price <= 0.0 || put.ask_price <= 0.0 {
            return Err(Block::new(
                BlockReason::NoInstruments,
                format!("no ask on {} or {}", call.instrument_name, put.instrument_name),
            ));
        }

        let quantity = resolve_quantity(&config.currency, config.qty);
        let costs = entry_costs(&call, &put, spot, quantity);
        let key = MarketKey::new(&config.currency, leg.expiry, wall.strike);

        match check_risk(&open, &key, costs.ask_usd, &limits) {
            RiskCheck::Approved { .. } => {}
            RiskCheck::MaxPositions { open, max } => {
                return Err(Block::new(BlockReason::MaxPositions, format!("{open} open, max {max}")))
            }
            RiskCheck::MaxRisk { open_risk_usd, max_risk_usd } => {
                return Err(Block::new(
                    BlockReason::MaxRisk,
                    format!("open risk {open_risk_usd} >= {max_risk_usd}"),
                ))
            }
            RiskCheck::WouldExceed {
                open_risk_usd,
                candidate_usd,
                max_risk_usd,
            } => {
                return Err(Block::new(
                    BlockReason::RiskWouldExceed,
                    format!("{open_risk_usd} + {candidate_usd} > {max_risk_usd}"),
                ))
            }
            RiskCheck::Duplicate { key } => {
                return Err(Block::new(BlockReason::DuplicateStrike, key.to_string()))
            }
        }

        if self.cancel.is_cancelled() {
            return Err(Block::cancelled());
        }

        let (entry_index, entry_last) = match config.spot_source {
            gex_desk_core::SpotSource::Index => (Some(spot), None),
            gex_desk_core::SpotSource::Last => (None, Some(spot)),
        };
        let request = OpenRequest {
            source: PositionSource::Bot,
            currency: key.currency.clone(),
            expiry: key.expiry.clone(),
            strike: key.strike,
            quantity,
            entry_spot: spot,
            entry_index,
            entry_last,
            call_instrument: call.instrument_name.clone(),
            put_instrument: put.instrument_name.clone(),
            entry_costs: costs,
            basis: PricingBasis::Ask,
        };

        let position = match self.state.ledger.open(request) {
            Ok(position) => position,
            Err(DeskError::Conflict { .. }) => {
                return Err(Block::new(BlockReason::DuplicateStrike, key.to_string()))
            }
            Err(e) => return Err(Block::new(BlockReason::Error, e.to_string())),
        };
        self.state.record_entry(now_ms);

        tracing::info!(
            id = %position.id,
            key = %key,
            wall_rank = wall.rank,
            spot,
            ask_cost = %costs.ask_usd,
            "Bot entered straddle on wall touch"
        );

        Ok(EntryRecord {
            position_id: position.id,
            key: key.to_string(),
            wall_strike: wall.strike,
            wall_rank: wall.rank,
            ask_cost_usd: costs.ask_usd,
        })
    }

    /// Evaluates exits for open positions in the configured currency.
    /// Per-position failures are recorded and skipped.
    async fn manage_exits(&self, config: &BotConfig, spot: f64, report: &mut TickReport) -> Result<(), Block> {
        let rules = ExitRules {
            sl_pnl_pct: config.sl_pnl_pct,
            tp_move_pct: config.tp_move_pct,
        };

        let (positions, other_currency): (Vec<_>, Vec<_>) = self
            .state
            .ledger
            .list_open()
            .into_iter()
            .partition(|p| p.currency.eq_ignore_ascii_case(&config.currency));
        if !other_currency.is_empty() {
            let skipped: Vec<String> = other_currency.iter().map(|p| p.key().to_string()).collect();
            tracing::debug!(
                currency = %config.currency,
                skipped = ?skipped,
                "Exit rules not applied to positions in other currencies"
            );
        }

        for pos in positions {
            let quotes = try_join(
                self.state.market.get_leg_quote(&pos.call_instrument),
                self.state.market.get_leg_quote(&pos.put_instrument),
            );
            let (call, put) = match self.call(quotes).await {
                Ok(quotes) => quotes,
                Err(Interrupt::Cancelled) => return Err(Block::cancelled()),
                Err(Interrupt::Failed(e)) => {
                    tracing::warn!(id = %pos.id, error = %e, "Leg quotes unavailable, skipping exit check");
                    report.exit_errors.push(format!("{}: {e}", pos.id));
                    continue;
                }
            };

            let valuation = value_of(&pos, &call, &put, spot);
            let Some(ExitSignal::Close { reason }) = check_exit_rules(&pos, &valuation, &rules) else {
                continue;
            };

            if self.cancel.is_cancelled() {
                return Err(Block::cancelled());
            }

            let fill = ExitFill {
                reason,
                exit_spot: spot,
                exit_value_usd: valuation.value_usd,
            };
            match self.state.ledger.close(&pos.id, fill) {
                Ok(closed) => {
                    if let Some(info) = &closed.close {
                        report.exits.push(ExitRecord {
                            position_id: closed.id.clone(),
                            key: closed.key().to_string(),
                            reason: info.reason,
                            exit_value_usd: info.exit_value_usd,
                            pnl_usd: info.pnl_usd,
                            pnl_pct: info.pnl_pct,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(id = %pos.id, error = %e, "Exit close failed");
                    report.exit_errors.push(format!("{}: {e}", pos.id));
                }
            }
        }
        Ok(())
    }

    /// Awaits `fut` with the fetch timeout, aborting on cancellation.
    async fn call<T, F>(&self, fut: F) -> Result<T, Interrupt>
    where
        F: Future<Output = gex_desk_core::Result<T>>,
    {
        let timeout = self.state.settings.fetch_timeout;
        self.guard(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(elapsed) => Err(elapsed.into()),
            }
        })
        .await
    }

    /// Awaits `fut`, aborting on cancellation.
    async fn guard<T, F>(&self, fut: F) -> Result<T, Interrupt>
    where
        F: Future<Output = gex_desk_core::Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            result = fut => result.map_err(Interrupt::Failed),
        }
    }

    fn publish_status(&self, state: LoopState) {
        let config = self.state.bot_config();
        let now_ms = Utc::now().timestamp_millis();
        self.status_tx.send_replace(BotStatus {
            state,
            enabled: config.enabled,
            auto_entry: config.auto_entry,
            currency: config.currency.clone(),
            ticks: self.ticks,
            last_tick_at: self.last_tick_at,
            last_spot: config.last_spot,
            last_block: self.last_block,
            last_entry_id: self.last_entry_id.clone(),
            open_positions: self.state.ledger.open_count(),
            cooldown_remaining_ms: config.cooldown_remaining_ms(now_ms),
            ledger_degraded: self.state.ledger.is_degraded() || self.state.config_degraded(),
            last_error: self.last_error.clone(),
        });
    }
}

/// Nearest wall that spot is touching or has crossed since `prev_spot`.
///
/// Touching: `|spot - k| <= max(1, spot * 5e-5)`. Crossing: `prev` and
/// `spot` lie strictly on opposite sides of `k`.
#[must_use]
pub fn touched_wall(walls: &[Wall], prev_spot: Option<f64>, spot: f64) -> Option<Wall> {
    let eps = (spot * TOUCH_EPS_FRACTION).max(TOUCH_EPS_MIN);
    walls
        .iter()
        .filter_map(|wall| {
            let k = wall.strike.to_f64()?;
            let touching = (spot - k).abs() <= eps;
            let crossed = prev_spot.is_some_and(|prev| (prev - k) * (spot - k) < 0.0);
            (touching || crossed).then_some((wall, (spot - k).abs()))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.strike.cmp(&b.0.strike)))
        .map(|(wall, _)| *wall)
}
