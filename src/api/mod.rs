//! Broker gateway: the trait the poll loop drives and its REST bridge client.

mod bridge_client;
mod broker;
mod types;

pub use bridge_client::{BridgeClient, DEFAULT_BRIDGE_URL};
pub use broker::{Broker, Credentials, OrderOutcome, StopModification};
