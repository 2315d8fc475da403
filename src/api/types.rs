//! Wire types for the MetaTrader 5 REST bridge.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{MarketTick, PositionSide, PositionSnapshot, SymbolInfo};

/// Open position from `GET /positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionResponse {
    pub ticket: u64,
    pub symbol: String,
    /// 0 = buy, 1 = sell
    #[serde(rename = "type")]
    pub position_type: i32,
    pub price_open: Decimal,
    /// 0 when no stop is set
    #[serde(default)]
    pub sl: Decimal,
    #[serde(default)]
    pub tp: Decimal,
    #[serde(default)]
    pub profit: Decimal,
}

impl PositionResponse {
    /// Convert to a typed snapshot, rejecting unknown position types.
    pub fn into_snapshot(self) -> Result<PositionSnapshot> {
        let side = PositionSide::from_broker_code(self.position_type).ok_or_else(|| {
            anyhow!(
                "position {} ({}) has unknown type {}",
                self.ticket,
                self.symbol,
                self.position_type
            )
        })?;

        let stop_loss = if self.sl.is_zero() { None } else { Some(self.sl) };

        Ok(PositionSnapshot {
            ticket: self.ticket,
            symbol: self.symbol,
            side,
            open_price: self.price_open,
            stop_loss,
            take_profit: self.tp,
            profit: self.profit,
        })
    }
}

/// Symbol metadata from `GET /symbols/{symbol}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfoResponse {
    pub point: Decimal,
    pub digits: u32,
}

impl From<SymbolInfoResponse> for SymbolInfo {
    fn from(r: SymbolInfoResponse) -> Self {
        SymbolInfo {
            point: r.point,
            digits: r.digits,
        }
    }
}

/// Quote from `GET /symbols/{symbol}/tick`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickResponse {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl From<TickResponse> for MarketTick {
    fn from(r: TickResponse) -> Self {
        MarketTick {
            bid: r.bid,
            ask: r.ask,
        }
    }
}

/// Answer to `POST /initialize` and `POST /shutdown`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub success: bool,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Trade request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Modify stop-loss/take-profit of an open position
    Sltp,
}

/// Body of `POST /order`.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tp: Decimal,
    pub position: u64,
}

/// Answer to `POST /order`.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeResultResponse {
    pub retcode: u32,
    #[serde(default)]
    pub comment: String,
}
