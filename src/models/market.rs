//! Per-symbol market data: instrument metadata and the current quote.

use rust_decimal::Decimal;

use super::PositionSide;

/// Instrument metadata needed to express prices in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Smallest price increment
    pub point: Decimal,

    /// Decimal places the broker accepts for prices
    pub digits: u32,
}

/// Current bid/ask for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketTick {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl MarketTick {
    /// Price at which a position on `side` could be closed right now.
    pub fn close_price(&self, side: PositionSide) -> Decimal {
        match side {
            PositionSide::Long => self.bid,
            PositionSide::Short => self.ask,
        }
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_close_price_by_side() {
        let tick = MarketTick {
            bid: dec!(150.010),
            ask: dec!(150.013),
        };

        assert_eq!(tick.close_price(PositionSide::Long), dec!(150.010));
        assert_eq!(tick.close_price(PositionSide::Short), dec!(150.013));
        assert_eq!(tick.spread(), dec!(0.003));
    }
}
