//! Trailing-stop decision for a single position.
//!
//! Given one position, its symbol metadata, the current quote, and the
//! trailing configuration, decide whether the stop-loss should move and to
//! what price. The evaluation is pure: identical inputs always produce the
//! identical decision.
//!
//! Steps, in order:
//! 1. Minimum-profit gate (currency or points, per [`ProfitGate`])
//! 2. Break-even gate: favorable movement must reach one trail distance
//! 3. Candidate = close price -/+ trail distance, rounded to symbol digits
//! 4. Optional entry lock: candidate must lie beyond the open price
//! 5. Ratchet: candidate must improve on the existing stop, if any

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{MarketTick, PositionSide, PositionSnapshot, SymbolInfo};

use super::{ProfitGate, RatchetMode, TrailingConfig};

/// New stop/take-profit pair to send to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopUpdate {
    pub stop_loss: Decimal,
    /// Existing take-profit, unchanged
    pub take_profit: Decimal,
}

/// Why a position's stop was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// Profit did not exceed the configured minimum
    BelowMinProfit { profit: Decimal },
    /// Price has not moved one trail distance in the position's favor
    BelowBreakEven { profit_points: Decimal },
    /// Candidate stop is not beyond the open price
    BehindEntry { candidate: Decimal },
    /// Candidate stop does not improve on the existing one
    NotImproved { candidate: Decimal, current: Decimal },
    /// Point size is zero or too small to express the move in points
    PointOutOfRange { point: Decimal },
}

/// Outcome of evaluating one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoAction(HoldReason),
    SetStop(StopUpdate),
}

impl Decision {
    pub fn is_set_stop(&self) -> bool {
        matches!(self, Decision::SetStop(_))
    }
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldReason::BelowMinProfit { profit } => {
                write!(f, "profit {} does not exceed minimum", profit)
            }
            HoldReason::BelowBreakEven { profit_points } => {
                write!(f, "profit_points={:.2} below trail distance", profit_points)
            }
            HoldReason::BehindEntry { candidate } => {
                write!(f, "candidate stop {} not beyond open price", candidate)
            }
            HoldReason::NotImproved { candidate, current } => {
                write!(f, "candidate stop {} does not improve on {}", candidate, current)
            }
            HoldReason::PointOutOfRange { point } => {
                write!(f, "point size {} out of range", point)
            }
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoAction(reason) => write!(f, "no action ({})", reason),
            Decision::SetStop(update) => write!(
                f,
                "set stop to {} (take-profit {})",
                update.stop_loss, update.take_profit
            ),
        }
    }
}

/// Favorable price movement since open, in points. Negative when underwater.
///
/// `None` when the move cannot be expressed in points: a zero point size, or
/// one so small the quotient overflows.
pub fn profit_points(
    position: &PositionSnapshot,
    symbol: &SymbolInfo,
    tick: &MarketTick,
) -> Option<Decimal> {
    let reference = tick.close_price(position.side);
    let moved = match position.side {
        PositionSide::Long => reference.checked_sub(position.open_price)?,
        PositionSide::Short => position.open_price.checked_sub(reference)?,
    };
    moved.checked_div(symbol.point)
}

/// Decide whether and where to move the stop-loss of `position`.
///
/// Callers are expected to skip symbols with a non-positive point size; a
/// point the arithmetic cannot handle yields `PointOutOfRange`.
pub fn evaluate(
    position: &PositionSnapshot,
    symbol: &SymbolInfo,
    tick: &MarketTick,
    config: &TrailingConfig,
) -> Decision {
    let out_of_range = Decision::NoAction(HoldReason::PointOutOfRange {
        point: symbol.point,
    });

    let Some(points) = profit_points(position, symbol, tick) else {
        return out_of_range;
    };

    let gated_profit = match config.profit_gate {
        ProfitGate::Currency => position.profit,
        ProfitGate::Points => points,
    };
    if gated_profit <= config.min_profit {
        return Decision::NoAction(HoldReason::BelowMinProfit {
            profit: gated_profit,
        });
    }

    if config.require_break_even && points < config.trail_distance_points {
        return Decision::NoAction(HoldReason::BelowBreakEven {
            profit_points: points,
        });
    }

    let reference = tick.close_price(position.side);
    let candidate = config
        .trail_distance_points
        .checked_mul(symbol.point)
        .and_then(|offset| match position.side {
            PositionSide::Long => reference.checked_sub(offset),
            PositionSide::Short => reference.checked_add(offset),
        });
    let Some(candidate) = candidate else {
        return out_of_range;
    };
    let candidate =
        candidate.round_dp_with_strategy(symbol.digits, RoundingStrategy::MidpointAwayFromZero);

    if config.lock_beyond_entry {
        let beyond = match position.side {
            PositionSide::Long => candidate > position.open_price,
            PositionSide::Short => candidate < position.open_price,
        };
        if !beyond {
            return Decision::NoAction(HoldReason::BehindEntry { candidate });
        }
    }

    if let Some(current) = position.stop_loss {
        if !improves(position.side, config.ratchet, candidate, current) {
            return Decision::NoAction(HoldReason::NotImproved { candidate, current });
        }
    }

    Decision::SetStop(StopUpdate {
        stop_loss: candidate,
        take_profit: position.take_profit,
    })
}

/// Ratchet rule: stops only ever move toward more protection.
fn improves(side: PositionSide, mode: RatchetMode, candidate: Decimal, current: Decimal) -> bool {
    match (side, mode) {
        (PositionSide::Long, RatchetMode::Strict) => candidate > current,
        (PositionSide::Long, RatchetMode::AllowEqual) => candidate >= current,
        (PositionSide::Short, RatchetMode::Strict) => candidate < current,
        (PositionSide::Short, RatchetMode::AllowEqual) => candidate <= current,
    }
}
