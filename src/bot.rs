//! Bot runner: the poll loop that keeps trailing stops up to date.
//!
//! Handles:
//! - Opening and always releasing the broker session
//! - Fetching open positions once per cycle
//! - Looking up symbol metadata and quotes per position
//! - Evaluating each position and submitting stop modifications
//! - Sleeping between cycles until interrupted

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::api::{Broker, Credentials, OrderOutcome, StopModification};
use crate::models::{MarketTick, PositionSnapshot, SymbolInfo};
use crate::trailing::{evaluate, Decision, HoldReason, StopUpdate, TrailingConfig};

/// Bot configuration.
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    /// Trailing-stop settings
    pub trailing: TrailingConfig,

    /// Broker login, empty to reuse the terminal's session
    pub credentials: Credentials,

    /// Only manage positions in these symbols; empty manages all
    pub symbols: Vec<String>,

    /// Evaluate and log, but never submit modifications
    pub dry_run: bool,

    /// Stop after this many cycles
    pub max_cycles: Option<u64>,
}

/// Cooperative stop request shared with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Counters for one poll cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Position list could not be fetched; nothing else was attempted
    pub positions_unavailable: bool,
    pub positions: usize,
    /// Excluded by the symbol filter
    pub filtered: usize,
    /// Missing or unusable market data
    pub skipped: usize,
    pub evaluated: usize,
    pub held: usize,
    pub modified: usize,
    /// Would have been modified in dry-run mode
    pub simulated: usize,
    pub rejected: usize,
    /// Submission failed before the broker answered
    pub failed: usize,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            positions_unavailable: false,
            positions: 0,
            filtered: 0,
            skipped: 0,
            evaluated: 0,
            held: 0,
            modified: 0,
            simulated: 0,
            rejected: 0,
            failed: 0,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self.started_at.with_timezone(&Local).format("%H:%M:%S");
        if self.positions_unavailable {
            return write!(f, "[{}] Positions unavailable", at);
        }
        write!(
            f,
            "[{}] Positions: {} | Evaluated: {} | Held: {} | Moved: {} | Dry run: {} | Rejected: {} | Failed: {} | Skipped: {} | Filtered: {}",
            at,
            self.positions,
            self.evaluated,
            self.held,
            self.modified,
            self.simulated,
            self.rejected,
            self.failed,
            self.skipped,
            self.filtered
        )
    }
}

/// Main bot runner.
pub struct Bot<B: Broker> {
    config: BotConfig,
    broker: B,
    shutdown: ShutdownHandle,
    last_report: Option<CycleReport>,
}

impl<B: Broker> Bot<B> {
    /// Create a new bot. Fails if the trailing configuration is invalid.
    pub fn new(broker: B, config: BotConfig) -> Result<Self> {
        config.trailing.validate()?;

        Ok(Self {
            config,
            broker,
            shutdown: ShutdownHandle::default(),
            last_report: None,
        })
    }

    /// Get shutdown handle for external control.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Report of the most recently completed cycle.
    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Open the broker session, poll until interrupted or `max_cycles` is
    /// reached, then release the session. The session is released on every
    /// exit path, including a failed connect.
    pub async fn run(&mut self) -> Result<()> {
        let connected = self.broker.connect(&self.config.credentials).await;
        let result = match connected {
            Ok(()) => {
                info!("Successfully connected to broker");
                self.poll_loop().await
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize broker session");
                Err(e.context("Failed to initialize broker session"))
            }
        };

        if let Err(e) = self.broker.shutdown().await {
            warn!(error = %e, "Broker shutdown failed");
        }
        info!("Broker connection shut down");

        result
    }

    async fn poll_loop(&mut self) -> Result<()> {
        let interval = self.config.trailing.poll_interval();
        info!(
            dry_run = self.config.dry_run,
            poll_interval_secs = self.config.trailing.poll_interval_secs,
            trail_distance = %self.config.trailing.trail_distance_points,
            min_profit = %self.config.trailing.min_profit,
            break_even = self.config.trailing.require_break_even,
            "Starting trailing-stop loop"
        );

        let mut cycles: u64 = 0;
        loop {
            if self.shutdown.is_triggered() {
                info!("Shutdown requested");
                break;
            }

            let report = self.run_cycle().await;
            debug!(report = %report, "Cycle complete");
            self.last_report = Some(report);
            cycles += 1;

            if self.config.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            tokio::select! {
                _ = self.shutdown.wait() => {
                    info!("Interrupted, stopping poll loop");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        Ok(())
    }

    /// Single pass over all open positions.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::new();

        let positions = match self.broker.positions().await {
            Ok(positions) => positions,
            Err(e) => {
                error!(error = %e, "Failed to get positions");
                report.positions_unavailable = true;
                return report;
            }
        };

        report.positions = positions.len();
        if positions.is_empty() {
            info!("No open positions");
            return report;
        }

        for position in &positions {
            if self.shutdown.is_triggered() {
                warn!("Shutdown requested, abandoning remaining positions");
                break;
            }

            if !self.manages(&position.symbol) {
                report.filtered += 1;
                continue;
            }

            self.process_position(position, &mut report).await;
        }

        report
    }

    fn manages(&self, symbol: &str) -> bool {
        self.config.symbols.is_empty() || self.config.symbols.iter().any(|s| s == symbol)
    }

    async fn market_data(&self, symbol: &str) -> Result<Option<(SymbolInfo, MarketTick)>> {
        let info = self.broker.symbol_info(symbol).await?;
        let tick = self.broker.tick(symbol).await?;
        Ok(info.zip(tick))
    }

    async fn process_position(&self, position: &PositionSnapshot, report: &mut CycleReport) {
        let (symbol, tick) = match self.market_data(&position.symbol).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                error!(
                    ticket = position.ticket,
                    symbol = %position.symbol,
                    "Failed to get symbol info or tick"
                );
                report.skipped += 1;
                return;
            }
            Err(e) => {
                error!(
                    ticket = position.ticket,
                    symbol = %position.symbol,
                    error = %e,
                    "Failed to get symbol info or tick"
                );
                report.skipped += 1;
                return;
            }
        };

        if symbol.point <= Decimal::ZERO {
            error!(
                ticket = position.ticket,
                symbol = %position.symbol,
                point = %symbol.point,
                "Symbol reports a non-positive point size"
            );
            report.skipped += 1;
            return;
        }

        debug!(
            ticket = position.ticket,
            symbol = %position.symbol,
            side = %position.side,
            has_stop = position.has_stop(),
            spread = %tick.spread(),
            "Evaluating position"
        );

        let decision = evaluate(position, &symbol, &tick, &self.config.trailing);
        report.evaluated += 1;
        debug!(
            ticket = position.ticket,
            move_stop = decision.is_set_stop(),
            decision = %decision,
            "Position evaluated"
        );

        match decision {
            Decision::NoAction(reason) => {
                report.held += 1;
                self.log_hold(position, &reason);
            }
            Decision::SetStop(update) => {
                self.submit(position, update, report).await;
            }
        }
    }

    fn log_hold(&self, position: &PositionSnapshot, reason: &HoldReason) {
        match reason {
            HoldReason::BelowBreakEven { profit_points } => info!(
                ticket = position.ticket,
                symbol = %position.symbol,
                side = %position.side,
                profit_points = %profit_points.round_dp(2),
                trail_distance = %self.config.trailing.trail_distance_points,
                "Skipping SL trail: profit_points below trail distance"
            ),
            HoldReason::PointOutOfRange { point } => warn!(
                ticket = position.ticket,
                symbol = %position.symbol,
                point = %point,
                "Skipping position: point size out of range"
            ),
            _ => debug!(
                ticket = position.ticket,
                symbol = %position.symbol,
                side = %position.side,
                reason = %reason,
                "Holding stop"
            ),
        }
    }

    async fn submit(&self, position: &PositionSnapshot, update: StopUpdate, report: &mut CycleReport) {
        if self.config.dry_run {
            info!(
                ticket = position.ticket,
                symbol = %position.symbol,
                side = %position.side,
                stop_loss = %update.stop_loss,
                previous = ?position.stop_loss,
                "[DRY RUN] Would move SL"
            );
            report.simulated += 1;
            return;
        }

        let request = StopModification {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            stop_loss: update.stop_loss,
            take_profit: update.take_profit,
        };

        match self.broker.modify_stops(&request).await {
            Ok(OrderOutcome::Done) => {
                info!(
                    ticket = position.ticket,
                    symbol = %position.symbol,
                    side = %position.side,
                    stop_loss = %update.stop_loss,
                    previous = ?position.stop_loss,
                    "Successfully moved SL"
                );
                report.modified += 1;
            }
            Ok(OrderOutcome::Rejected { retcode, comment }) => {
                error!(
                    ticket = position.ticket,
                    symbol = %position.symbol,
                    side = %position.side,
                    stop_loss = %update.stop_loss,
                    retcode,
                    comment = %comment,
                    "Failed to move SL"
                );
                report.rejected += 1;
            }
            Err(e) => {
                error!(
                    ticket = position.ticket,
                    symbol = %position.symbol,
                    side = %position.side,
                    stop_loss = %update.stop_loss,
                    error = %e,
                    "Failed to submit SL modification"
                );
                report.failed += 1;
            }
        }
    }
}
