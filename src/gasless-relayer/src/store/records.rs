//! Rows persisted from decoded entrypoint events.

use alloy_primitives::{Address, B256, U256};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{
    addr_key, b256_key, from_sql_int, is_unique_violation, now_rfc3339, parse_addr, parse_b256, parse_u256, sql_int, Store,
    StoreError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalRecord {
    pub proposal_id: U256,
    pub proposer: Address,
    pub market_id: B256,
    pub title: String,
    pub description: String,
    pub stake_amount: U256,
    pub relay_id: Uuid,
    pub tx_hash: B256,
    pub block_number: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRecord {
    pub id: Uuid,
    pub proposal_id: U256,
    pub voter: Address,
    pub support: bool,
    pub nullifier_hash: U256,
    pub relay_id: Uuid,
    pub tx_hash: B256,
    pub block_number: u64,
}

impl VoteRecord {
    pub fn vote_label(&self) -> &'static str {
        if self.support {
            "FOR"
        } else {
            "AGAINST"
        }
    }
}

impl Store {
    /// Idempotent: the reconciler may replay a confirmation that was already recorded.
    pub fn insert_proposal(&self, rec: &ProposalRecord) -> Result<(), StoreError> {
        let block_number = sql_int("block_number", rec.block_number)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO proposals
                (proposal_id, proposer, market_id, title, description, stake_amount, relay_id, tx_hash, block_number, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rec.proposal_id.to_string(),
                addr_key(rec.proposer),
                b256_key(rec.market_id),
                rec.title,
                rec.description,
                rec.stake_amount.to_string(),
                rec.relay_id.to_string(),
                b256_key(rec.tx_hash),
                block_number,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert a vote, returning the id of the stored row (the existing one on replay).
    pub fn insert_vote(&self, rec: &VoteRecord) -> Result<Uuid, StoreError> {
        let block_number = sql_int("block_number", rec.block_number)?;
        let res = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO votes
                    (id, proposal_id, voter, vote, nullifier_hash, relay_id, tx_hash, block_number, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    rec.id.to_string(),
                    rec.proposal_id.to_string(),
                    addr_key(rec.voter),
                    rec.vote_label(),
                    rec.nullifier_hash.to_string(),
                    rec.relay_id.to_string(),
                    b256_key(rec.tx_hash),
                    block_number,
                    now_rfc3339(),
                ],
            )
        };
        match res {
            Ok(_) => Ok(rec.id),
            Err(e) if is_unique_violation(&e) => self
                .vote_by_nullifier(rec.proposal_id, rec.nullifier_hash)?
                .map(|v| v.id)
                .ok_or(StoreError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    pub fn proposal(&self, proposal_id: U256) -> Result<Option<ProposalRecord>, StoreError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT proposer, market_id, title, description, stake_amount, relay_id, tx_hash, block_number
                 FROM proposals WHERE proposal_id = ?1",
                [proposal_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()?
        };
        let Some((proposer, market_id, title, description, stake, relay_id, tx_hash, block)) = raw else {
            return Ok(None);
        };
        Ok(Some(ProposalRecord {
            proposal_id,
            proposer: parse_addr(&proposer)?,
            market_id: parse_b256(&market_id)?,
            title,
            description,
            stake_amount: parse_u256(&stake)?,
            relay_id: parse_uuid(&relay_id)?,
            tx_hash: parse_b256(&tx_hash)?,
            block_number: from_sql_int("block_number", block)?,
        }))
    }

    pub fn vote_by_nullifier(&self, proposal_id: U256, nullifier_hash: U256) -> Result<Option<VoteRecord>, StoreError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id, voter, vote, relay_id, tx_hash, block_number
                 FROM votes WHERE proposal_id = ?1 AND nullifier_hash = ?2",
                params![proposal_id.to_string(), nullifier_hash.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?
        };
        let Some((id, voter, vote, relay_id, tx_hash, block)) = raw else {
            return Ok(None);
        };
        Ok(Some(VoteRecord {
            id: parse_uuid(&id)?,
            proposal_id,
            voter: parse_addr(&voter)?,
            support: vote == "FOR",
            nullifier_hash,
            relay_id: parse_uuid(&relay_id)?,
            tx_hash: parse_b256(&tx_hash)?,
            block_number: from_sql_int("block_number", block)?,
        }))
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|_| StoreError::Corrupt(format!("uuid {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_replay_returns_existing_id() {
        let store = Store::open_in_memory().unwrap();
        let vote = VoteRecord {
            id: Uuid::new_v4(),
            proposal_id: U256::from(7u8),
            voter: Address::repeat_byte(0x22),
            support: true,
            nullifier_hash: U256::from(99u8),
            relay_id: Uuid::new_v4(),
            tx_hash: B256::repeat_byte(4),
            block_number: 12,
        };
        assert_eq!(store.insert_vote(&vote).unwrap(), vote.id);

        let replay = VoteRecord {
            id: Uuid::new_v4(),
            ..vote.clone()
        };
        assert_eq!(store.insert_vote(&replay).unwrap(), vote.id);

        let stored = store.vote_by_nullifier(vote.proposal_id, vote.nullifier_hash).unwrap().unwrap();
        assert_eq!(stored.vote_label(), "FOR");
        assert_eq!(stored, vote);
    }

    #[test]
    fn proposal_insert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let rec = ProposalRecord {
            proposal_id: U256::from(1u8),
            proposer: Address::repeat_byte(0x33),
            market_id: B256::repeat_byte(5),
            title: "Rain in Lisbon".into(),
            description: "Will it rain on Friday?".into(),
            stake_amount: U256::from(10u8),
            relay_id: Uuid::new_v4(),
            tx_hash: B256::repeat_byte(6),
            block_number: 3,
        };
        store.insert_proposal(&rec).unwrap();
        store.insert_proposal(&rec).unwrap();
        assert_eq!(store.proposal(rec.proposal_id).unwrap(), Some(rec));
    }
}
