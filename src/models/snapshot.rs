//! Position snapshot: immutable view of one open position at poll time.

use std::fmt;

use rust_decimal::Decimal;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Map the broker's numeric position type (0 = buy, 1 = sell).
    pub fn from_broker_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Long),
            1 => Some(Self::Short),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open position as reported by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    /// Broker ticket identifying the position
    pub ticket: u64,

    /// Instrument identifier
    pub symbol: String,

    /// Long or short
    pub side: PositionSide,

    /// Price the position was opened at
    pub open_price: Decimal,

    /// Active stop-loss, `None` when no stop is set
    pub stop_loss: Option<Decimal>,

    /// Active take-profit, passed through untouched
    pub take_profit: Decimal,

    /// Floating P&L in account currency
    pub profit: Decimal,
}

impl PositionSnapshot {
    pub fn has_stop(&self) -> bool {
        self.stop_loss.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_broker_code() {
        assert_eq!(PositionSide::from_broker_code(0), Some(PositionSide::Long));
        assert_eq!(PositionSide::from_broker_code(1), Some(PositionSide::Short));
        assert_eq!(PositionSide::from_broker_code(2), None);
        assert_eq!(PositionSide::from_broker_code(-1), None);
    }
}
