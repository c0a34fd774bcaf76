//! Gasless relayer for the prediction market.
//!
//! Users sign EIP-712 intents (create proposal, cast vote, zap into a position); the relayer
//! verifies them, guards the per-signer nonce and submits them to the entrypoint from its own hot
//! wallet. The same service builds Merkle reward distributions and serves claim proofs.

pub mod api;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod humanity;
pub mod intake;
pub mod nonce;
pub mod relayer;
pub mod rewards;
pub mod store;
pub mod verify;

pub use chain::{ChainClient, ChainError, EthersChain};
pub use errors::IntentError;
pub use intake::Intake;
pub use relayer::{Relayer, RelayerHandle, RelaySettings, RelayTicket};
pub use rewards::Rewards;
pub use store::Store;

use time::OffsetDateTime;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}
