//! Typed views of broker data: positions, symbol metadata, and quotes.

mod market;
mod snapshot;

pub use market::{MarketTick, SymbolInfo};
pub use snapshot::{PositionSide, PositionSnapshot};
