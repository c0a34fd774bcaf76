//! `relayed_transactions`: one row per relay attempt, moved strictly forward through its statuses.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use market_primitives::IntentKind;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{
    addr_key, b256_key, from_sql_int, is_unique_violation, now_rfc3339, parse_addr, parse_b256, parse_u256, sql_int, Store,
    StoreError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayStatus {
    PendingRelay,
    Submitted,
    Confirmed,
    Failed,
}

impl RelayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayStatus::PendingRelay => "PENDING_RELAY",
            RelayStatus::Submitted => "SUBMITTED",
            RelayStatus::Confirmed => "CONFIRMED",
            RelayStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_RELAY" => Some(RelayStatus::PendingRelay),
            "SUBMITTED" => Some(RelayStatus::Submitted),
            "CONFIRMED" => Some(RelayStatus::Confirmed),
            "FAILED" => Some(RelayStatus::Failed),
            _ => None,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, RelayStatus::Confirmed | RelayStatus::Failed)
    }

    /// Statuses a row may be in when moving to `next`.
    fn predecessors(next: RelayStatus) -> &'static [RelayStatus] {
        match next {
            RelayStatus::PendingRelay => &[],
            RelayStatus::Submitted => &[RelayStatus::PendingRelay],
            RelayStatus::Confirmed => &[RelayStatus::Submitted],
            RelayStatus::Failed => &[RelayStatus::PendingRelay, RelayStatus::Submitted],
        }
    }

    /// SQL condition admitting exactly the rows allowed to move to `next`.
    fn guard(next: RelayStatus) -> String {
        let allowed: Vec<String> = Self::predecessors(next)
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        format!("status IN ({})", allowed.join(", "))
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct NewRelay {
    pub id: Uuid,
    pub intent_ref: B256,
    pub kind: IntentKind,
    pub signer: Address,
    pub intent_nonce: U256,
    pub chain_id: u64,
    pub calldata: Bytes,
    /// Everything needed to finish the relay after a restart (vote details, derived position id).
    pub context: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelayRecord {
    pub id: Uuid,
    pub intent_ref: B256,
    pub kind: IntentKind,
    pub signer: Address,
    pub intent_nonce: U256,
    pub chain_id: u64,
    pub status: RelayStatus,
    pub calldata: Bytes,
    pub context: serde_json::Value,
    pub relayer_nonce: Option<u64>,
    pub prepared_hash: Option<B256>,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, intent_ref, kind, signer, intent_nonce, chain_id, status, calldata, context, \
     relayer_nonce, prepared_hash, tx_hash, block_number, gas_used, result, error_kind, error, created_at, updated_at";

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRelay> {
    Ok(RawRelay {
        id: row.get(0)?,
        intent_ref: row.get(1)?,
        kind: row.get(2)?,
        signer: row.get(3)?,
        intent_nonce: row.get(4)?,
        chain_id: row.get(5)?,
        status: row.get(6)?,
        calldata: row.get(7)?,
        context: row.get(8)?,
        relayer_nonce: row.get(9)?,
        prepared_hash: row.get(10)?,
        tx_hash: row.get(11)?,
        block_number: row.get(12)?,
        gas_used: row.get(13)?,
        result: row.get(14)?,
        error_kind: row.get(15)?,
        error: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

/// Column values as SQLite hands them back; parsed into [`RelayRecord`] outside the row closure.
struct RawRelay {
    id: String,
    intent_ref: String,
    kind: String,
    signer: String,
    intent_nonce: String,
    chain_id: i64,
    status: String,
    calldata: Vec<u8>,
    context: String,
    relayer_nonce: Option<i64>,
    prepared_hash: Option<String>,
    tx_hash: Option<String>,
    block_number: Option<i64>,
    gas_used: Option<String>,
    result: Option<String>,
    error_kind: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RawRelay> for RelayRecord {
    type Error = StoreError;

    fn try_from(raw: RawRelay) -> Result<Self, StoreError> {
        let json = |s: &str| serde_json::from_str(s).map_err(|e| StoreError::Corrupt(format!("json: {e}")));
        Ok(RelayRecord {
            id: Uuid::parse_str(&raw.id).map_err(|_| StoreError::Corrupt(format!("uuid {:?}", raw.id)))?,
            intent_ref: parse_b256(&raw.intent_ref)?,
            kind: raw.kind.parse().map_err(StoreError::Corrupt)?,
            signer: parse_addr(&raw.signer)?,
            intent_nonce: parse_u256(&raw.intent_nonce)?,
            chain_id: from_sql_int("chain_id", raw.chain_id)?,
            status: RelayStatus::parse(&raw.status)
                .ok_or_else(|| StoreError::Corrupt(format!("status {:?}", raw.status)))?,
            calldata: Bytes::from(raw.calldata),
            context: json(&raw.context)?,
            relayer_nonce: raw.relayer_nonce.map(|n| from_sql_int("relayer_nonce", n)).transpose()?,
            prepared_hash: raw.prepared_hash.as_deref().map(parse_b256).transpose()?,
            tx_hash: raw.tx_hash.as_deref().map(parse_b256).transpose()?,
            block_number: raw.block_number.map(|n| from_sql_int("block_number", n)).transpose()?,
            gas_used: raw.gas_used.as_deref().map(parse_u256).transpose()?,
            result: raw.result.as_deref().map(json).transpose()?,
            error_kind: raw.error_kind,
            error: raw.error,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

impl Store {
    /// Insert a PENDING_RELAY row. `Duplicate` if a live row already exists for the intent.
    pub fn insert_relay(&self, new: &NewRelay) -> Result<(), StoreError> {
        let chain_id = sql_int("chain_id", new.chain_id)?;
        let now = now_rfc3339();
        let conn = self.conn.lock();
        let res = conn.execute(
            "INSERT INTO relayed_transactions
                (id, intent_ref, kind, signer, intent_nonce, chain_id, status, calldata, context, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                new.id.to_string(),
                b256_key(new.intent_ref),
                new.kind.as_str(),
                addr_key(new.signer),
                new.intent_nonce.to_string(),
                chain_id,
                RelayStatus::PendingRelay.as_str(),
                new.calldata.to_vec(),
                new.context.to_string(),
                now,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    pub fn relay(&self, id: Uuid) -> Result<Option<RelayRecord>, StoreError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM relayed_transactions WHERE id = ?1"),
                [id.to_string()],
                read_row,
            )
            .optional()?
        };
        raw.map(RelayRecord::try_from).transpose()
    }

    /// The non-FAILED row for an intent, if any.
    pub fn live_relay_for_intent(&self, intent_ref: B256) -> Result<Option<RelayRecord>, StoreError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM relayed_transactions WHERE intent_ref = ?1 AND status != 'FAILED'"),
                [b256_key(intent_ref)],
                read_row,
            )
            .optional()?
        };
        raw.map(RelayRecord::try_from).transpose()
    }

    pub fn relays_in_status(&self, status: RelayStatus) -> Result<Vec<RelayRecord>, StoreError> {
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM relayed_transactions WHERE status = ?1 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([status.as_str()], read_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(RelayRecord::try_from).collect()
    }

    /// Record the relayer nonce and hash of the signed transaction before it is broadcast.
    pub fn mark_prepared(&self, id: Uuid, relayer_nonce: u64, prepared_hash: B256) -> Result<(), StoreError> {
        let relayer_nonce = sql_int("relayer_nonce", relayer_nonce)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE relayed_transactions SET relayer_nonce = ?2, prepared_hash = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'PENDING_RELAY'",
            params![id.to_string(), relayer_nonce, b256_key(prepared_hash), now_rfc3339()],
        )?;
        drop(conn);
        self.expect_changed(changed, id, RelayStatus::PendingRelay)
    }

    pub fn mark_submitted(&self, id: Uuid, tx_hash: B256) -> Result<(), StoreError> {
        self.transition(id, RelayStatus::Submitted, |conn, now, guard| {
            conn.execute(
                &format!(
                    "UPDATE relayed_transactions SET status = 'SUBMITTED', tx_hash = ?2, updated_at = ?3
                     WHERE id = ?1 AND {guard}"
                ),
                params![id.to_string(), b256_key(tx_hash), now],
            )
        })
    }

    pub fn mark_confirmed(
        &self,
        id: Uuid,
        block_number: u64,
        gas_used: U256,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let block_number = sql_int("block_number", block_number)?;
        self.transition(id, RelayStatus::Confirmed, |conn, now, guard| {
            conn.execute(
                &format!(
                    "UPDATE relayed_transactions
                     SET status = 'CONFIRMED', block_number = ?2, gas_used = ?3, result = ?4, updated_at = ?5
                     WHERE id = ?1 AND {guard}"
                ),
                params![id.to_string(), block_number, gas_used.to_string(), result.to_string(), now],
            )
        })
    }

    /// Move a PENDING_RELAY or SUBMITTED row to FAILED. Mined failures also carry block and gas.
    pub fn mark_failed(
        &self,
        id: Uuid,
        error_kind: &str,
        error: &str,
        mined: Option<(u64, U256)>,
    ) -> Result<(), StoreError> {
        let (block, gas) = match mined {
            Some((block, gas)) => (Some(sql_int("block_number", block)?), Some(gas.to_string())),
            None => (None, None),
        };
        self.transition(id, RelayStatus::Failed, |conn, now, guard| {
            conn.execute(
                &format!(
                    "UPDATE relayed_transactions
                     SET status = 'FAILED', error_kind = ?2, error = ?3, block_number = ?4, gas_used = ?5, updated_at = ?6
                     WHERE id = ?1 AND {guard}"
                ),
                params![id.to_string(), error_kind, error, block, gas, now],
            )
        })
    }

    fn transition<F>(&self, id: Uuid, to: RelayStatus, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&rusqlite::Connection, &str, &str) -> rusqlite::Result<usize>,
    {
        let now = now_rfc3339();
        let guard = RelayStatus::guard(to);
        let changed = {
            let conn = self.conn.lock();
            update(&conn, &now, &guard)?
        };
        self.expect_changed(changed, id, to)
    }

    fn expect_changed(&self, changed: usize, id: Uuid, to: RelayStatus) -> Result<(), StoreError> {
        if changed == 1 {
            return Ok(());
        }
        let from = match self.relay(id)? {
            Some(row) => row.status.as_str().to_string(),
            None => "<missing>".to_string(),
        };
        Err(StoreError::InvalidTransition {
            id: id.to_string(),
            from,
            to: to.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_relay(intent_ref: B256) -> NewRelay {
        NewRelay {
            id: Uuid::new_v4(),
            intent_ref,
            kind: IntentKind::CastVote,
            signer: Address::repeat_byte(0x11),
            intent_nonce: U256::from(5u8),
            chain_id: 480,
            calldata: Bytes::from_static(&[0xde, 0xad]),
            context: serde_json::json!({ "support": true }),
        }
    }

    #[test]
    fn row_round_trips_through_sqlite() {
        let store = Store::open_in_memory().unwrap();
        let new = new_relay(B256::repeat_byte(1));
        store.insert_relay(&new).unwrap();

        let row = store.relay(new.id).unwrap().unwrap();
        assert_eq!(row.status, RelayStatus::PendingRelay);
        assert_eq!(row.intent_nonce, U256::from(5u8));
        assert_eq!(row.calldata, new.calldata);
        assert_eq!(row.context, new.context);
        assert_eq!(row.tx_hash, None);
    }

    #[test]
    fn statuses_only_move_forward() {
        let store = Store::open_in_memory().unwrap();
        let new = new_relay(B256::repeat_byte(2));
        store.insert_relay(&new).unwrap();

        // cannot confirm before submission
        let err = store
            .mark_confirmed(new.id, 10, U256::from(21_000u32), &serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { to: "CONFIRMED", .. }));

        store.mark_prepared(new.id, 7, B256::repeat_byte(9)).unwrap();
        store.mark_submitted(new.id, B256::repeat_byte(9)).unwrap();
        store
            .mark_confirmed(new.id, 10, U256::from(21_000u32), &serde_json::json!({ "voteId": "x" }))
            .unwrap();

        assert!(store.mark_failed(new.id, "CHAIN_REVERT", "late", None).is_err());
        assert!(store.mark_submitted(new.id, B256::repeat_byte(3)).is_err());

        let row = store.relay(new.id).unwrap().unwrap();
        assert_eq!(row.status, RelayStatus::Confirmed);
        assert_eq!(row.relayer_nonce, Some(7));
        assert_eq!(row.block_number, Some(10));
    }

    #[test]
    fn one_live_row_per_intent() {
        let store = Store::open_in_memory().unwrap();
        let intent_ref = B256::repeat_byte(3);
        let first = new_relay(intent_ref);
        store.insert_relay(&first).unwrap();
        assert!(matches!(store.insert_relay(&new_relay(intent_ref)), Err(StoreError::Duplicate)));

        // a failed attempt frees the intent for resubmission
        store.mark_failed(first.id, "CHAIN_REVERT", "reverted", None).unwrap();
        let retry = new_relay(intent_ref);
        store.insert_relay(&retry).unwrap();
        assert_eq!(store.live_relay_for_intent(intent_ref).unwrap().unwrap().id, retry.id);
    }

    #[test]
    fn oversized_relayer_nonce_is_refused() {
        let store = Store::open_in_memory().unwrap();
        let new = new_relay(B256::repeat_byte(4));
        store.insert_relay(&new).unwrap();
        assert!(matches!(
            store.mark_prepared(new.id, u64::MAX, B256::repeat_byte(5)),
            Err(StoreError::OutOfRange { field: "relayer_nonce", .. })
        ));
        assert_eq!(store.relay(new.id).unwrap().unwrap().relayer_nonce, None);
    }

    #[test]
    fn transition_guards() {
        use RelayStatus::*;
        assert_eq!(RelayStatus::guard(Submitted), "status IN ('PENDING_RELAY')");
        assert_eq!(RelayStatus::guard(Confirmed), "status IN ('SUBMITTED')");
        assert_eq!(RelayStatus::guard(Failed), "status IN ('PENDING_RELAY', 'SUBMITTED')");
    }
}
