//! Constants shared with the deployed entrypoint.

pub use market_primitives::{DOMAIN_NAME, DOMAIN_VERSION};

/// Extra gas on top of `eth_estimateGas`, in percent.
pub const DEFAULT_GAS_HEADROOM_PCT: u64 = 25;
