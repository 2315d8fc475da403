//! Broker gateway seam: everything the poll loop needs from a trading platform.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{MarketTick, PositionSnapshot, SymbolInfo};

/// Return code the platform uses for a completed trade request.
pub const TRADE_RETCODE_DONE: u32 = 10009;

/// Optional login details. Unset fields fall back to whatever session the
/// terminal already has active.
#[derive(Clone, Default, Serialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.login.is_none() && self.password.is_none() && self.server.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("server", &self.server)
            .finish()
    }
}

/// Request to replace the stop-loss of an open position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopModification {
    pub ticket: u64,
    pub symbol: String,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Broker's answer to a stop modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Done,
    /// Broker-specific return code and comment, reported as received
    Rejected { retcode: u32, comment: String },
}

impl OrderOutcome {
    pub fn from_retcode(retcode: u32, comment: String) -> Self {
        if retcode == TRADE_RETCODE_DONE {
            OrderOutcome::Done
        } else {
            OrderOutcome::Rejected { retcode, comment }
        }
    }
}

/// Trading platform session.
///
/// Calls are issued one at a time by the poll loop; timeouts and retries of
/// read queries are the implementation's concern.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open the session. Failure here is fatal for the process.
    async fn connect(&mut self, credentials: &Credentials) -> Result<()>;

    /// Release the session. Safe to call when not connected.
    async fn shutdown(&mut self) -> Result<()>;

    /// All currently open positions.
    async fn positions(&self) -> Result<Vec<PositionSnapshot>>;

    /// Symbol metadata, `None` if the broker does not know the symbol.
    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>>;

    /// Latest quote, `None` if no quote is available.
    async fn tick(&self, symbol: &str) -> Result<Option<MarketTick>>;

    /// Submit a stop-loss/take-profit change. Never retried.
    async fn modify_stops(&self, request: &StopModification) -> Result<OrderOutcome>;
}
