//! Typed decoding of entrypoint receipt logs.
//!
//! Decoders are registered per event under `SolEvent::SIGNATURE_HASH`, so each log costs one map
//! lookup on `topics[0]`. Logs from other emitters or with unknown signatures are skipped.

use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use tracing::warn;

use crate::{chain::LogEntry, contracts::IGaslessEntrypoint};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntrypointEvent {
    ProposalCreated {
        proposal_id: U256,
        proposer: Address,
        market_id: B256,
        stake_amount: U256,
    },
    VoteCast {
        proposal_id: U256,
        voter: Address,
        support: bool,
        nullifier_hash: U256,
    },
    ZapExecuted {
        user: Address,
        condition_id: B256,
        outcome_index: U256,
        usdc_in: U256,
        shares_out: U256,
        position_id: U256,
    },
}

type Decoder = fn(&[B256], &[u8]) -> alloy_sol_types::Result<EntrypointEvent>;

pub struct EventRegistry {
    emitter: Address,
    decoders: HashMap<B256, (&'static str, Decoder)>,
}

impl EventRegistry {
    pub fn new(emitter: Address) -> Self {
        let mut registry = Self {
            emitter,
            decoders: HashMap::new(),
        };
        registry.register::<IGaslessEntrypoint::ProposalCreated>(|topics, data| {
            let e = IGaslessEntrypoint::ProposalCreated::decode_raw_log(topics.iter().copied(), data, true)?;
            Ok(EntrypointEvent::ProposalCreated {
                proposal_id: e.proposalId,
                proposer: e.proposer,
                market_id: e.marketId,
                stake_amount: e.stakeAmount,
            })
        });
        registry.register::<IGaslessEntrypoint::VoteCast>(|topics, data| {
            let e = IGaslessEntrypoint::VoteCast::decode_raw_log(topics.iter().copied(), data, true)?;
            Ok(EntrypointEvent::VoteCast {
                proposal_id: e.proposalId,
                voter: e.voter,
                support: e.support,
                nullifier_hash: e.nullifierHash,
            })
        });
        registry.register::<IGaslessEntrypoint::ZapExecuted>(|topics, data| {
            let e = IGaslessEntrypoint::ZapExecuted::decode_raw_log(topics.iter().copied(), data, true)?;
            Ok(EntrypointEvent::ZapExecuted {
                user: e.user,
                condition_id: e.conditionId,
                outcome_index: e.outcomeIndex,
                usdc_in: e.usdcIn,
                shares_out: e.sharesOut,
                position_id: e.positionId,
            })
        });
        registry
    }

    fn register<E: SolEvent>(&mut self, decoder: Decoder) {
        self.decoders.insert(E::SIGNATURE_HASH, (E::SIGNATURE, decoder));
    }

    pub fn decode(&self, log: &LogEntry) -> Option<EntrypointEvent> {
        if log.address != self.emitter {
            return None;
        }
        let topic0 = log.topics.first()?;
        let (name, decoder) = self.decoders.get(topic0)?;
        match decoder(&log.topics, &log.data) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(event = name, %err, "malformed entrypoint log skipped");
                None
            }
        }
    }

    pub fn decode_all(&self, logs: &[LogEntry]) -> Vec<EntrypointEvent> {
        logs.iter().filter_map(|log| self.decode(log)).collect()
    }
}
