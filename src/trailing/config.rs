//! Trailing-stop configuration.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Unit the minimum-profit gate is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ProfitGate {
    /// Floating P&L in account currency
    Currency,
    /// Favorable price movement in points
    Points,
}

/// How a candidate stop must compare to the current one to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RatchetMode {
    /// Candidate must strictly improve on the current stop
    Strict,
    /// Candidate equal to the current stop is also accepted
    AllowEqual,
}

/// Configuration for trailing-stop evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Distance in points the stop trails behind the close price
    pub trail_distance_points: Decimal,

    /// Profit that must be exceeded before trailing is considered
    pub min_profit: Decimal,

    /// Only trail once price has moved at least one trail distance
    pub require_break_even: bool,

    /// Seconds between the end of one poll cycle and the start of the next
    pub poll_interval_secs: f64,

    /// Unit `min_profit` is compared in
    pub profit_gate: ProfitGate,

    /// Stop improvement rule
    pub ratchet: RatchetMode,

    /// Only accept stops that lie beyond the open price
    pub lock_beyond_entry: bool,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            trail_distance_points: dec!(4),
            min_profit: dec!(11),
            require_break_even: true,
            poll_interval_secs: 0.5,
            profit_gate: ProfitGate::Currency,
            ratchet: RatchetMode::Strict,
            lock_beyond_entry: false,
        }
    }
}

impl TrailingConfig {
    /// Reject configurations the evaluator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.trail_distance_points <= Decimal::ZERO {
            bail!(
                "trail distance must be positive, got {} points",
                self.trail_distance_points
            );
        }
        let representable = std::time::Duration::try_from_secs_f64(self.poll_interval_secs).is_ok();
        if !representable || self.poll_interval_secs <= 0.0 {
            bail!(
                "poll interval must be a positive number of seconds, got {}",
                self.poll_interval_secs
            );
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TrailingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_distance() {
        let config = TrailingConfig {
            trail_distance_points: Decimal::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrailingConfig {
            trail_distance_points: dec!(-1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_poll_interval() {
        for secs in [0.0, -2.0, f64::NAN, f64::INFINITY, 1e20] {
            let config = TrailingConfig {
                poll_interval_secs: secs,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted interval {secs}");
        }
    }

    #[test]
    fn test_poll_interval_duration() {
        let config = TrailingConfig::default();
        assert_eq!(config.poll_interval().as_millis(), 500);
    }

    #[test]
    fn test_serde_uses_snake_case_policies() {
        let json = serde_json::to_value(TrailingConfig::default()).unwrap();
        assert_eq!(json["profit_gate"], "currency");
        assert_eq!(json["ratchet"], "strict");
    }
}
