//! SQLite persistence for relays, the nonce cache, decoded records and reward distributions.
//!
//! One connection behind a mutex; every statement is short. Uniqueness that the protocol relies
//! on (one live relay per intent, one claim per distribution and address) is enforced by the
//! schema, not by application checks.

mod distributions;
mod records;
mod relays;

use std::path::Path;

use alloy_primitives::{Address, B256, U256};
use parking_lot::Mutex;
use rusqlite::Connection;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;

pub use distributions::{ClaimRow, ClaimableRow, DistributionRow, DistributionStatus};
pub use records::{ProposalRecord, VoteRecord};
pub use relays::{NewRelay, RelayRecord, RelayStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unique constraint violated")]
    Duplicate,
    #[error("relay {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: &'static str,
    },
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("{field} {value} does not fit an sqlite integer")]
    OutOfRange { field: &'static str, value: u64 },
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS relayed_transactions (
    id              TEXT PRIMARY KEY,
    intent_ref      TEXT NOT NULL,
    kind            TEXT NOT NULL,
    signer          TEXT NOT NULL,
    intent_nonce    TEXT NOT NULL,
    chain_id        INTEGER NOT NULL,
    status          TEXT NOT NULL,
    calldata        BLOB NOT NULL,
    context         TEXT NOT NULL,
    relayer_nonce   INTEGER,
    prepared_hash   TEXT,
    tx_hash         TEXT,
    block_number    INTEGER,
    gas_used        TEXT,
    result          TEXT,
    error_kind      TEXT,
    error           TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS relays_live_intent
    ON relayed_transactions(intent_ref) WHERE status != 'FAILED';
CREATE INDEX IF NOT EXISTS relays_status ON relayed_transactions(status);

CREATE TABLE IF NOT EXISTS nonce_records (
    signer      TEXT PRIMARY KEY,
    nonce       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proposals (
    proposal_id   TEXT PRIMARY KEY,
    proposer      TEXT NOT NULL,
    market_id     TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT NOT NULL,
    stake_amount  TEXT NOT NULL,
    relay_id      TEXT NOT NULL,
    tx_hash       TEXT NOT NULL,
    block_number  INTEGER NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS votes (
    id              TEXT PRIMARY KEY,
    proposal_id     TEXT NOT NULL,
    voter           TEXT NOT NULL,
    vote            TEXT NOT NULL,
    nullifier_hash  TEXT NOT NULL,
    relay_id        TEXT NOT NULL,
    tx_hash         TEXT NOT NULL,
    block_number    INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE (proposal_id, nullifier_hash)
);

CREATE TABLE IF NOT EXISTS merkle_distributions (
    id            TEXT PRIMARY KEY,
    root          TEXT,
    period_start  INTEGER NOT NULL,
    period_end    INTEGER NOT NULL,
    expires_at    INTEGER NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    published_at  TEXT
);

CREATE TABLE IF NOT EXISTS merkle_leaves (
    distribution_id  TEXT NOT NULL REFERENCES merkle_distributions(id),
    address          TEXT NOT NULL,
    amount           TEXT NOT NULL,
    PRIMARY KEY (distribution_id, address)
);
CREATE INDEX IF NOT EXISTS merkle_leaves_address ON merkle_leaves(address);

CREATE TABLE IF NOT EXISTS reward_claims (
    distribution_id  TEXT NOT NULL REFERENCES merkle_distributions(id),
    claimer          TEXT NOT NULL,
    amount           TEXT NOT NULL,
    proof            TEXT NOT NULL,
    claimed_at       TEXT NOT NULL,
    PRIMARY KEY (distribution_id, claimer)
);
";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn cached_nonce(&self, signer: Address) -> Result<Option<U256>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT nonce FROM nonce_records WHERE signer = ?1")?;
        let mut rows = stmt.query([addr_key(signer)])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_u256(&row.get::<_, String>(0)?)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the cached nonce for `signer`.
    pub fn set_cached_nonce(&self, signer: Address, nonce: U256) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO nonce_records (signer, nonce, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(signer) DO UPDATE SET nonce = excluded.nonce, updated_at = excluded.updated_at",
            rusqlite::params![addr_key(signer), nonce.to_string(), now_rfc3339()],
        )?;
        Ok(())
    }

    /// Raise the cached nonce; never lowers it, since nonces only move forward.
    pub fn raise_cached_nonce(&self, signer: Address, nonce: U256) -> Result<(), StoreError> {
        match self.cached_nonce(signer)? {
            Some(current) if current >= nonce => Ok(()),
            _ => self.set_cached_nonce(signer, nonce),
        }
    }
}

pub(crate) fn addr_key(addr: Address) -> String {
    format!("{addr:#x}")
}

pub(crate) fn b256_key(hash: B256) -> String {
    format!("{hash:#x}")
}

pub(crate) fn parse_addr(s: &str) -> Result<Address, StoreError> {
    s.parse().map_err(|_| StoreError::Corrupt(format!("address {s:?}")))
}

pub(crate) fn parse_b256(s: &str) -> Result<B256, StoreError> {
    s.parse().map_err(|_| StoreError::Corrupt(format!("hash {s:?}")))
}

pub(crate) fn parse_u256(s: &str) -> Result<U256, StoreError> {
    U256::from_str_radix(s, 10).map_err(|_| StoreError::Corrupt(format!("uint256 {s:?}")))
}

/// SQLite integers are signed 64-bit.
pub(crate) fn sql_int(field: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange { field, value })
}

pub(crate) fn from_sql_int(field: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} {value}")))
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
