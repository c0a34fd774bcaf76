//! Chain access abstraction.
//!
//! The relayer only needs a handful of RPC capabilities. Keeping them behind [`ChainClient`] lets
//! the production ethers-backed client and the in-memory test chain share one pipeline.

pub mod ethers_client;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

pub use ethers_client::EthersChain;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    /// The call or estimate reverted; carries the raw revert data.
    #[error("execution reverted")]
    Reverted(Bytes),
    #[error("could not decode return data: {0}")]
    Decode(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("chain id mismatch: configured {configured}, node reports {reported}")]
    ChainIdMismatch { configured: u64, reported: u64 },
}

/// A transaction from the relayer wallet, ready to be signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub nonce: u64,
    pub gas_limit: u64,
}

/// Signed raw transaction bytes and their hash (known before broadcast).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub hash: B256,
    pub raw: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
    pub gas_used: U256,
    pub logs: Vec<LogEntry>,
}

#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    fn chain_id(&self) -> u64;

    /// Address of the hot wallet paying for relayed transactions.
    fn relayer_address(&self) -> Address;

    async fn balance(&self, who: Address) -> Result<U256, ChainError>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Transaction count of `who`; `pending` includes the mempool.
    async fn transaction_count(&self, who: Address, pending: bool) -> Result<u64, ChainError>;

    /// Gas estimate for a call from the relayer wallet. A revert is `ChainError::Reverted`.
    async fn estimate_gas(&self, to: Address, data: Bytes) -> Result<u64, ChainError>;

    async fn sign(&self, tx: &TxRequest) -> Result<SignedTx, ChainError>;

    async fn send_raw(&self, raw: Bytes) -> Result<B256, ChainError>;

    /// `None` while the transaction is unknown or not yet mined.
    async fn receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError>;

    /// Re-run a mined call at `block` to recover its revert data. `None` if it does not revert.
    async fn replay_revert(&self, to: Address, data: Bytes, block: u64) -> Result<Option<Bytes>, ChainError>;
}
