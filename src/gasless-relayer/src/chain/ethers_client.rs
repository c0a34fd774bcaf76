//! `ChainClient` over an ethers HTTP provider and a local hot wallet.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, BlockId, BlockNumber, Bytes as EBytes,
        TransactionRequest, H160, H256, U256 as EU256,
    },
};
use tracing::debug;

use super::{ChainClient, ChainError, LogEntry, SignedTx, TxReceipt, TxRequest};

pub struct EthersChain {
    provider: Provider<Http>,
    wallet: LocalWallet,
    chain_id: u64,
}

impl EthersChain {
    /// Connect to `rpc_url` and bind the wallet to the node's chain id.
    ///
    /// Fails if `expected_chain_id` is set and the node reports a different chain, so a
    /// misconfigured RPC never receives transactions signed for another network.
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        expected_chain_id: Option<u64>,
    ) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| ChainError::Rpc(e.to_string()))?;
        let reported = provider.get_chainid().await.map_err(map_provider_error)?.low_u64();
        if let Some(configured) = expected_chain_id {
            if configured != reported {
                return Err(ChainError::ChainIdMismatch { configured, reported });
            }
        }
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::Signing(e.to_string()))?
            .with_chain_id(reported);
        debug!(chain_id = reported, relayer = %wallet.address(), "connected to chain");
        Ok(Self {
            provider,
            wallet,
            chain_id: reported,
        })
    }

    fn request(&self, to: Address, data: Bytes) -> TransactionRequest {
        TransactionRequest::new()
            .from(self.wallet.address())
            .to(to_h160(to))
            .data(EBytes::from(data.to_vec()))
    }
}

#[async_trait]
impl ChainClient for EthersChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn relayer_address(&self) -> Address {
        Address::from(self.wallet.address().0)
    }

    async fn balance(&self, who: Address) -> Result<U256, ChainError> {
        let balance = self
            .provider
            .get_balance(to_h160(who), None)
            .await
            .map_err(map_provider_error)?;
        Ok(from_eu256(balance))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = self.request(to, data).into();
        let out = self.provider.call(&tx, None).await.map_err(map_provider_error)?;
        Ok(Bytes::from(out.to_vec()))
    }

    async fn transaction_count(&self, who: Address, pending: bool) -> Result<u64, ChainError> {
        let tag = if pending { BlockNumber::Pending } else { BlockNumber::Latest };
        let count = self
            .provider
            .get_transaction_count(to_h160(who), Some(BlockId::Number(tag)))
            .await
            .map_err(map_provider_error)?;
        Ok(count.low_u64())
    }

    async fn estimate_gas(&self, to: Address, data: Bytes) -> Result<u64, ChainError> {
        let tx: TypedTransaction = self.request(to, data).into();
        let gas = self
            .provider
            .estimate_gas(&tx, None)
            .await
            .map_err(map_provider_error)?;
        Ok(gas.low_u64())
    }

    async fn sign(&self, tx: &TxRequest) -> Result<SignedTx, ChainError> {
        let gas_price = self.provider.get_gas_price().await.map_err(map_provider_error)?;
        let typed: TypedTransaction = self
            .request(tx.to, tx.data.clone())
            .nonce(tx.nonce)
            .gas(tx.gas_limit)
            .gas_price(gas_price)
            .chain_id(self.chain_id)
            .into();
        let signature = self
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);
        Ok(SignedTx {
            hash: keccak256(raw.as_ref()),
            raw: Bytes::from(raw.to_vec()),
        })
    }

    async fn send_raw(&self, raw: Bytes) -> Result<B256, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(EBytes::from(raw.to_vec()))
            .await
            .map_err(map_provider_error)?;
        Ok(B256::from(pending.tx_hash().0))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(H256::from(hash.0))
            .await
            .map_err(map_provider_error)?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        Ok(Some(TxReceipt {
            tx_hash: hash,
            block_number: block_number.as_u64(),
            success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            gas_used: receipt.gas_used.map(from_eu256).unwrap_or_default(),
            logs: receipt
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: Address::from(log.address.0),
                    topics: log.topics.into_iter().map(|t| B256::from(t.0)).collect(),
                    data: Bytes::from(log.data.to_vec()),
                })
                .collect(),
        }))
    }

    async fn replay_revert(&self, to: Address, data: Bytes, block: u64) -> Result<Option<Bytes>, ChainError> {
        let tx: TypedTransaction = self.request(to, data).into();
        let at = BlockId::Number(BlockNumber::Number(block.into()));
        match self.provider.call(&tx, Some(at)).await {
            Ok(_) => Ok(None),
            Err(err) => match map_provider_error(err) {
                ChainError::Reverted(data) => Ok(Some(data)),
                other => Err(other),
            },
        }
    }
}

fn map_provider_error(err: ProviderError) -> ChainError {
    if let Some(data) = err.as_error_response().and_then(|e| e.as_revert_data()) {
        return ChainError::Reverted(Bytes::from(data.to_vec()));
    }
    ChainError::Rpc(err.to_string())
}

fn to_h160(addr: Address) -> H160 {
    H160::from(addr.0 .0)
}

fn from_eu256(value: EU256) -> U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}
