//! In-memory entrypoint chain and a wired-up relayer for integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolError, SolEvent, SolInterface, SolValue};
use async_trait::async_trait;
use gasless_relayer::{
    chain::{ChainClient, ChainError, LogEntry, SignedTx, TxReceipt, TxRequest},
    contracts::{
        constants::{DOMAIN_NAME, DOMAIN_VERSION},
        IGaslessEntrypoint::{self, IGaslessEntrypointCalls},
    },
    humanity::{HumanityError, HumanityOracle, WorldIdProof},
    verify::Verifier,
    Intake, Relayer, RelayerHandle, RelaySettings, Rewards, Store,
};
use k256::ecdsa::SigningKey;
use market_primitives::{ecdsa, ids, Domain, IndexSet, Intent};
use parking_lot::Mutex;

pub const CHAIN_ID: u64 = 480;
pub const ENTRYPOINT: Address = address!("e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0");
pub const COLLATERAL: Address = address!("c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0");
pub const RELAYER: Address = address!("5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e");
pub const GAS_ESTIMATE: u64 = 100_000;

/// Scripted misbehaviour for the next `send_raw` calls, consumed in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendFault {
    /// The node refuses the transaction.
    Refuse,
    /// The transaction is mined but the response is lost, and nonce queries start failing.
    LostResponse,
    /// The call never returns; only a timeout gets the caller out.
    Stall,
}

#[derive(Default)]
struct Faults {
    sends: VecDeque<SendFault>,
    /// Accepted transactions wait in the mempool until `mine_pending`.
    hold_sends: bool,
    failing_counts: bool,
    hidden_receipts: usize,
    /// Balance reads answered before the relayer balance reads as zero.
    balance_reads_left: Option<usize>,
}

#[derive(Default)]
struct ChainState {
    balance: U256,
    nonces: HashMap<Address, U256>,
    nullifiers: HashSet<U256>,
    next_proposal_id: U256,
    relayer_nonce: u64,
    block: u64,
    mempool: Vec<Bytes>,
    receipts: HashMap<B256, TxReceipt>,
    reverts: HashMap<Bytes, Bytes>,
    faults: Faults,
    nonce_reads: usize,
    sends: usize,
    estimates: usize,
}

/// Simulates the gasless entrypoint: nonce checks, nullifier uniqueness, events and the relayer
/// account. A broadcast transaction is mined immediately unless sends are held or scripted to fail.
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                balance: U256::from(10u64).pow(U256::from(18u8)),
                next_proposal_id: U256::from(1u8),
                block: 100,
                ..Default::default()
            }),
        }
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().balance = balance;
    }

    pub fn set_nonce(&self, signer: Address, nonce: u64) {
        self.state.lock().nonces.insert(signer, U256::from(nonce));
    }

    pub fn nonce_of(&self, signer: Address) -> U256 {
        self.state.lock().nonces.get(&signer).copied().unwrap_or_default()
    }

    pub fn use_nullifier(&self, nullifier: U256) {
        self.state.lock().nullifiers.insert(nullifier);
    }

    pub fn nonce_reads(&self) -> usize {
        self.state.lock().nonce_reads
    }

    pub fn sends(&self) -> usize {
        self.state.lock().sends
    }

    pub fn relayer_nonce(&self) -> u64 {
        self.state.lock().relayer_nonce
    }

    pub fn script_sends(&self, faults: impl IntoIterator<Item = SendFault>) {
        self.state.lock().faults.sends.extend(faults);
    }

    pub fn hold_sends(&self, hold: bool) {
        self.state.lock().faults.hold_sends = hold;
    }

    pub fn pending_txs(&self) -> usize {
        self.state.lock().mempool.len()
    }

    pub fn mine_pending(&self) {
        self.state.lock().mine_pending();
    }

    /// Another transaction from the relayer wallet is mined at the next nonce, evicting
    /// whatever was waiting there.
    pub fn take_relayer_slot(&self) {
        let mut state = self.state.lock();
        state.mempool.clear();
        state.relayer_nonce += 1;
        state.block += 1;
    }

    pub fn fail_counts(&self, fail: bool) {
        self.state.lock().faults.failing_counts = fail;
    }

    /// The next `n` receipt lookups miss, as with a lagging receipt index.
    pub fn hide_receipts(&self, n: usize) {
        self.state.lock().faults.hidden_receipts = n;
    }

    pub fn drain_balance_after(&self, reads: usize) {
        self.state.lock().faults.balance_reads_left = Some(reads);
    }

    pub fn is_mined(&self, hash: B256) -> bool {
        self.state.lock().receipts.contains_key(&hash)
    }
}

fn log<E: SolEvent>(event: &E) -> LogEntry {
    let data = event.encode_log_data();
    LogEntry {
        address: ENTRYPOINT,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
    }
}

fn invalid_nonce(signer: Address, expected: U256, provided: U256) -> Bytes {
    IGaslessEntrypoint::InvalidNonce {
        signer,
        expected,
        provided,
    }
    .abi_encode()
    .into()
}

impl ChainState {
    /// Take a signed transaction into the mempool, mining it unless sends are held.
    fn accept(&mut self, raw: Bytes) -> Result<(), ChainError> {
        if raw.len() < 28 {
            return Err(ChainError::Rpc("malformed transaction".into()));
        }
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&raw[..8]);
        let expected = self.relayer_nonce + self.mempool.len() as u64;
        match u64::from_be_bytes(nonce) {
            n if n < expected => return Err(ChainError::Rpc("nonce too low".into())),
            n if n > expected => return Err(ChainError::Rpc("nonce too high".into())),
            _ => {}
        }
        self.mempool.push(raw);
        if !self.faults.hold_sends {
            self.mine_pending();
        }
        Ok(())
    }

    fn mine_pending(&mut self) {
        for raw in std::mem::take(&mut self.mempool) {
            self.mine(raw);
        }
    }

    fn mine(&mut self, raw: Bytes) {
        let hash = keccak256(&raw);
        let data = Bytes::copy_from_slice(&raw[28..]);
        self.relayer_nonce += 1;
        self.block += 1;
        let (success, logs) = match self.execute(&data, true) {
            Ok(logs) => (true, logs),
            Err(revert) => {
                self.reverts.insert(data, revert);
                (false, Vec::new())
            }
        };
        let receipt = TxReceipt {
            tx_hash: hash,
            block_number: self.block,
            success,
            gas_used: U256::from(GAS_ESTIMATE - 10_000),
            logs,
        };
        self.receipts.insert(hash, receipt);
    }

    fn check_nonce(&self, signer: Address, provided: U256) -> Result<(), Bytes> {
        let expected = self.nonces.get(&signer).copied().unwrap_or_default();
        if expected != provided {
            return Err(invalid_nonce(signer, expected, provided));
        }
        Ok(())
    }

    fn bump(&mut self, signer: Address) {
        let next = self.nonces.get(&signer).copied().unwrap_or_default() + U256::from(1u8);
        self.nonces.insert(signer, next);
    }

    /// Run entrypoint calldata. `commit` applies state changes; the logs are returned either way.
    fn execute(&mut self, data: &[u8], commit: bool) -> Result<Vec<LogEntry>, Bytes> {
        let call = IGaslessEntrypointCalls::abi_decode(data, true).map_err(|_| Bytes::new())?;
        match call {
            IGaslessEntrypointCalls::createProposalWithSig(c) => {
                self.check_nonce(c.proposer, c.nonce)?;
                let proposal_id = self.next_proposal_id;
                if commit {
                    self.bump(c.proposer);
                    self.next_proposal_id += U256::from(1u8);
                }
                Ok(vec![log(&IGaslessEntrypoint::ProposalCreated {
                    proposalId: proposal_id,
                    proposer: c.proposer,
                    marketId: c.marketId,
                    stakeAmount: c.stakeAmount,
                })])
            }
            IGaslessEntrypointCalls::castVoteWithSig(c) => {
                self.check_nonce(c.voter, c.nonce)?;
                if self.nullifiers.contains(&c.nullifierHash) {
                    return Err(IGaslessEntrypoint::NullifierUsed {
                        nullifierHash: c.nullifierHash,
                    }
                    .abi_encode()
                    .into());
                }
                if commit {
                    self.bump(c.voter);
                    self.nullifiers.insert(c.nullifierHash);
                }
                Ok(vec![log(&IGaslessEntrypoint::VoteCast {
                    proposalId: c.proposalId,
                    voter: c.voter,
                    support: c.support,
                    nullifierHash: c.nullifierHash,
                })])
            }
            IGaslessEntrypointCalls::zapWithSig(c) => {
                self.check_nonce(c.user, c.nonce)?;
                let shares_out = c.wldAmount * U256::from(2u8);
                if shares_out < c.minSharesOut {
                    return Err(IGaslessEntrypoint::SlippageExceeded {
                        minimum: c.minSharesOut,
                        actual: shares_out,
                    }
                    .abi_encode()
                    .into());
                }
                let outcome_index = u64::try_from(c.outcomeIndex).map_err(|_| Bytes::new())?;
                let outcome = IndexSet::for_outcome(outcome_index).map_err(|_| Bytes::new())?;
                if commit {
                    self.bump(c.user);
                }
                Ok(vec![log(&IGaslessEntrypoint::ZapExecuted {
                    user: c.user,
                    conditionId: c.conditionId,
                    outcomeIndex: c.outcomeIndex,
                    usdcIn: c.wldAmount,
                    sharesOut: shares_out,
                    positionId: ids::binary_position_id(COLLATERAL, c.conditionId, outcome),
                })])
            }
            IGaslessEntrypointCalls::nonces(_) => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    fn relayer_address(&self) -> Address {
        RELAYER
    }

    async fn balance(&self, who: Address) -> Result<U256, ChainError> {
        let mut state = self.state.lock();
        if who != RELAYER {
            return Ok(U256::ZERO);
        }
        match state.faults.balance_reads_left.as_mut() {
            Some(0) => Ok(U256::ZERO),
            Some(left) => {
                *left -= 1;
                Ok(state.balance)
            }
            None => Ok(state.balance),
        }
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let mut state = self.state.lock();
        match IGaslessEntrypointCalls::abi_decode(&data, true) {
            Ok(IGaslessEntrypointCalls::nonces(c)) => {
                state.nonce_reads += 1;
                let nonce = state.nonces.get(&c.owner).copied().unwrap_or_default();
                Ok(nonce.abi_encode().into())
            }
            _ => Err(ChainError::Rpc("unsupported call".into())),
        }
    }

    async fn transaction_count(&self, who: Address, pending: bool) -> Result<u64, ChainError> {
        let state = self.state.lock();
        if state.faults.failing_counts {
            return Err(ChainError::Rpc("connection refused".into()));
        }
        if who != RELAYER {
            return Ok(0);
        }
        Ok(if pending {
            state.relayer_nonce + state.mempool.len() as u64
        } else {
            state.relayer_nonce
        })
    }

    async fn estimate_gas(&self, _to: Address, data: Bytes) -> Result<u64, ChainError> {
        let mut state = self.state.lock();
        state.estimates += 1;
        state.execute(&data, false).map_err(ChainError::Reverted)?;
        Ok(GAS_ESTIMATE)
    }

    async fn sign(&self, tx: &TxRequest) -> Result<SignedTx, ChainError> {
        let mut raw = tx.nonce.to_be_bytes().to_vec();
        raw.extend_from_slice(tx.to.as_slice());
        raw.extend_from_slice(&tx.data);
        Ok(SignedTx {
            hash: keccak256(&raw),
            raw: raw.into(),
        })
    }

    async fn send_raw(&self, raw: Bytes) -> Result<B256, ChainError> {
        let fault = self.state.lock().faults.sends.pop_front();
        if fault == Some(SendFault::Stall) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }

        let hash = keccak256(&raw);
        let mut state = self.state.lock();
        state.sends += 1;
        if state.receipts.contains_key(&hash) || state.mempool.contains(&raw) {
            return Ok(hash);
        }
        match fault {
            Some(SendFault::Refuse) => Err(ChainError::Rpc("transaction underpriced".into())),
            Some(SendFault::LostResponse) => {
                state.accept(raw)?;
                state.faults.failing_counts = true;
                Err(ChainError::Rpc("request timed out".into()))
            }
            _ => {
                state.accept(raw)?;
                Ok(hash)
            }
        }
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let mut state = self.state.lock();
        if state.faults.hidden_receipts > 0 {
            state.faults.hidden_receipts -= 1;
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn replay_revert(&self, _to: Address, data: Bytes, _block: u64) -> Result<Option<Bytes>, ChainError> {
        Ok(self.state.lock().reverts.get(&data).cloned())
    }
}

/// Accepts every proof and returns its nullifier, unless told to reject.
pub struct StaticHumanity {
    pub accept: bool,
}

#[async_trait]
impl HumanityOracle for StaticHumanity {
    async fn verify(&self, proof: &WorldIdProof, _signal: Address) -> Result<U256, HumanityError> {
        if !self.accept {
            return Err(HumanityError::Rejected("verification failed".into()));
        }
        proof.nullifier()
    }
}

pub fn world_id_proof(nullifier: u64) -> WorldIdProof {
    WorldIdProof {
        merkle_root: "0x01".into(),
        nullifier_hash: nullifier.to_string(),
        proof: "0x02".into(),
        verification_level: "orb".into(),
    }
}

pub fn test_settings() -> RelaySettings {
    RelaySettings {
        min_relayer_balance: U256::from(1_000u64),
        broadcast_timeout: Duration::from_millis(500),
        broadcast_retries: 1,
        receipt_poll_interval: Duration::from_millis(10),
        rebroadcast_interval: Duration::from_millis(200),
        confirmation_timeout: Duration::from_secs(5),
        ..RelaySettings::new(ENTRYPOINT, COLLATERAL)
    }
}

pub fn domain() -> Domain {
    Domain::new(DOMAIN_NAME, DOMAIN_VERSION, CHAIN_ID, ENTRYPOINT)
}

/// A user wallet signing intents against the test domain.
pub struct User {
    key: SigningKey,
    pub address: Address,
}

impl User {
    pub fn new(seed: u8) -> Self {
        let key = SigningKey::from_slice(&[seed; 32]).expect("valid key");
        let address = ecdsa::address_of(key.verifying_key());
        Self { key, address }
    }

    pub fn sign<I: Intent>(&self, intent: &I) -> Vec<u8> {
        ecdsa::sign_digest(&self.key, intent.signing_digest(&domain()))
            .expect("sign")
            .to_vec()
    }
}

pub fn far_deadline() -> u64 {
    gasless_relayer::unix_now() + 3_600
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub store: Arc<Store>,
    pub relayer: Relayer,
    pub handle: RelayerHandle,
    pub intake: Intake,
    pub rewards: Rewards,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Arc::new(MockChain::new()), Arc::new(Store::open_in_memory().expect("store")), true)
    }

    pub fn with(chain: Arc<MockChain>, store: Arc<Store>, humans: bool) -> Self {
        Self::with_settings(chain, store, humans, test_settings())
    }

    pub fn with_settings(chain: Arc<MockChain>, store: Arc<Store>, humans: bool, settings: RelaySettings) -> Self {
        let dyn_chain: Arc<dyn ChainClient> = chain.clone();
        let relayer = Relayer::new(dyn_chain.clone(), store.clone(), settings.clone());
        let (handle, _worker) = relayer.start();
        let intake = Intake::new(
            Verifier::new(domain()),
            handle.clone(),
            store.clone(),
            dyn_chain,
            Arc::new(StaticHumanity { accept: humans }),
            &settings,
        );
        Self {
            rewards: Rewards::new(store.clone()),
            chain,
            store,
            relayer,
            handle,
            intake,
        }
    }
}
