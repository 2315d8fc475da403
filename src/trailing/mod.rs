//! Trailing-stop logic: configuration and the per-position evaluator.

mod config;
mod evaluator;

pub use config::{ProfitGate, RatchetMode, TrailingConfig};
pub use evaluator::{evaluate, profit_points, Decision, HoldReason, StopUpdate};
