//! Merkle distributions, their leaf sets and the claim ledger.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use super::{
    addr_key, b256_key, from_sql_int, is_unique_violation, now_rfc3339, parse_addr, parse_b256, parse_u256, sql_int, Store,
    StoreError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionStatus {
    Draft,
    Published,
    Expired,
}

impl DistributionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DistributionStatus::Draft => "DRAFT",
            DistributionStatus::Published => "PUBLISHED",
            DistributionStatus::Expired => "EXPIRED",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "DRAFT" => Ok(DistributionStatus::Draft),
            "PUBLISHED" => Ok(DistributionStatus::Published),
            "EXPIRED" => Ok(DistributionStatus::Expired),
            other => Err(StoreError::Corrupt(format!("distribution status {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionRow {
    pub id: Uuid,
    pub root: Option<B256>,
    pub period_start: u64,
    pub period_end: u64,
    pub expires_at: u64,
    pub status: DistributionStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRow {
    pub distribution_id: Uuid,
    pub claimer: Address,
    pub amount: U256,
    pub proof: Vec<B256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimableRow {
    pub distribution_id: Uuid,
    pub root: B256,
    pub amount: U256,
    pub period_start: u64,
    pub period_end: u64,
    pub expires_at: u64,
}

type RawDistribution = (String, Option<String>, i64, i64, i64, String);

fn distribution_from_raw(raw: RawDistribution) -> Result<DistributionRow, StoreError> {
    let (id, root, start, end, expires, status) = raw;
    Ok(DistributionRow {
        id: Uuid::parse_str(&id).map_err(|_| StoreError::Corrupt(format!("uuid {id:?}")))?,
        root: root.as_deref().map(parse_b256).transpose()?,
        period_start: from_sql_int("period_start", start)?,
        period_end: from_sql_int("period_end", end)?,
        expires_at: from_sql_int("expires_at", expires)?,
        status: DistributionStatus::parse(&status)?,
    })
}

impl Store {
    /// Store a DRAFT distribution and its leaves in one transaction.
    pub fn insert_distribution(&self, row: &DistributionRow, leaves: &BTreeMap<Address, U256>) -> Result<(), StoreError> {
        let period_start = sql_int("period_start", row.period_start)?;
        let period_end = sql_int("period_end", row.period_end)?;
        let expires_at = sql_int("expires_at", row.expires_at)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO merkle_distributions (id, root, period_start, period_end, expires_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id.to_string(),
                row.root.map(b256_key),
                period_start,
                period_end,
                expires_at,
                row.status.as_str(),
                now_rfc3339(),
            ],
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO merkle_leaves (distribution_id, address, amount) VALUES (?1, ?2, ?3)")?;
            for (address, amount) in leaves {
                stmt.execute(params![row.id.to_string(), addr_key(*address), amount.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn distribution(&self, id: Uuid) -> Result<Option<DistributionRow>, StoreError> {
        let raw: Option<RawDistribution> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id, root, period_start, period_end, expires_at, status FROM merkle_distributions WHERE id = ?1",
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            )
            .optional()?
        };
        raw.map(distribution_from_raw).transpose()
    }

    pub fn distribution_leaves(&self, id: Uuid) -> Result<BTreeMap<Address, U256>, StoreError> {
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached("SELECT address, amount FROM merkle_leaves WHERE distribution_id = ?1")?;
            let rows = stmt.query_map([id.to_string()], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter()
            .map(|(addr, amount)| Ok((parse_addr(&addr)?, parse_u256(&amount)?)))
            .collect()
    }

    /// DRAFT → PUBLISHED with `root`. Returns false if the row was not a draft.
    pub fn publish_distribution(&self, id: Uuid, root: B256) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE merkle_distributions SET status = 'PUBLISHED', root = ?2, published_at = ?3
             WHERE id = ?1 AND status = 'DRAFT'",
            params![id.to_string(), b256_key(root), now_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// PUBLISHED → EXPIRED for every distribution whose expiry is at or before `now`.
    pub fn expire_distributions(&self, now: u64) -> Result<usize, StoreError> {
        // past the signed range every stored expiry is due
        let now = i64::try_from(now).unwrap_or(i64::MAX);
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE merkle_distributions SET status = 'EXPIRED' WHERE status = 'PUBLISHED' AND expires_at <= ?1",
            [now],
        )?;
        Ok(changed)
    }

    pub fn has_claim(&self, id: Uuid, claimer: Address) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM reward_claims WHERE distribution_id = ?1 AND claimer = ?2",
                params![id.to_string(), addr_key(claimer)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record a claim. `Duplicate` if the address already claimed from this distribution.
    pub fn insert_claim(&self, claim: &ClaimRow) -> Result<(), StoreError> {
        let proof: Vec<String> = claim.proof.iter().copied().map(b256_key).collect();
        let proof = serde_json::to_string(&proof).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let conn = self.conn.lock();
        let res = conn.execute(
            "INSERT INTO reward_claims (distribution_id, claimer, amount, proof, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                claim.distribution_id.to_string(),
                addr_key(claim.claimer),
                claim.amount.to_string(),
                proof,
                now_rfc3339(),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    /// Published, unexpired distributions with an unclaimed leaf for `address`.
    pub fn claimable_for(&self, address: Address, now: u64) -> Result<Vec<ClaimableRow>, StoreError> {
        let now = i64::try_from(now).unwrap_or(i64::MAX);
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT d.id, d.root, l.amount, d.period_start, d.period_end, d.expires_at
                 FROM merkle_leaves l
                 JOIN merkle_distributions d ON d.id = l.distribution_id
                 WHERE l.address = ?1
                   AND d.status = 'PUBLISHED'
                   AND d.expires_at > ?2
                   AND NOT EXISTS (
                       SELECT 1 FROM reward_claims c
                       WHERE c.distribution_id = d.id AND c.claimer = l.address
                   )
                 ORDER BY d.period_end DESC",
            )?;
            let rows = stmt.query_map(params![addr_key(address), now], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter()
            .map(|(id, root, amount, start, end, expires)| {
                Ok(ClaimableRow {
                    distribution_id: Uuid::parse_str(&id).map_err(|_| StoreError::Corrupt(format!("uuid {id:?}")))?,
                    root: parse_b256(&root)?,
                    amount: parse_u256(&amount)?,
                    period_start: from_sql_int("period_start", start)?,
                    period_end: from_sql_int("period_end", end)?,
                    expires_at: from_sql_int("expires_at", expires)?,
                })
            })
            .collect()
    }
}
