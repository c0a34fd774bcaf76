//! "Is this a unique human" checks for voting, backed by World ID.

use std::time::Duration;

use alloy_primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HumanityError {
    #[error("proof rejected: {0}")]
    Rejected(String),
    #[error("humanity oracle unavailable: {0}")]
    Unavailable(String),
}

/// World ID proof as produced by IDKit. Field names follow the World ID wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldIdProof {
    pub merkle_root: String,
    pub nullifier_hash: String,
    pub proof: String,
    pub verification_level: String,
}

impl WorldIdProof {
    pub fn nullifier(&self) -> Result<U256, HumanityError> {
        market_primitives::serde_u256::parse(&self.nullifier_hash)
            .map_err(|e| HumanityError::Rejected(format!("nullifier_hash: {e}")))
    }
}

#[async_trait]
pub trait HumanityOracle: Send + Sync + 'static {
    /// Verify `proof` for `signal` and return the nullifier it commits to.
    async fn verify(&self, proof: &WorldIdProof, signal: Address) -> Result<U256, HumanityError>;
}

pub struct WorldIdClient {
    http: reqwest::Client,
    endpoint: String,
    action: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    nullifier_hash: &'a str,
    merkle_root: &'a str,
    proof: &'a str,
    verification_level: &'a str,
    action: &'a str,
    signal_hash: String,
}

#[derive(Deserialize)]
struct VerifyRejection {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl WorldIdClient {
    pub fn new(api_base: &str, app_id: &str, action: impl Into<String>, timeout: Duration) -> Result<Self, HumanityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HumanityError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/v2/verify/{app_id}", api_base.trim_end_matches('/')),
            action: action.into(),
        })
    }
}

/// World ID `hashToField`: keccak256 of the packed signal, shifted right one byte.
pub fn signal_hash(signal: Address) -> String {
    let hashed = U256::from_be_bytes(keccak256(signal.as_slice()).0) >> 8;
    format!("{hashed:#066x}")
}

#[async_trait]
impl HumanityOracle for WorldIdClient {
    async fn verify(&self, proof: &WorldIdProof, signal: Address) -> Result<U256, HumanityError> {
        let nullifier = proof.nullifier()?;
        let body = VerifyRequest {
            nullifier_hash: &proof.nullifier_hash,
            merkle_root: &proof.merkle_root,
            proof: &proof.proof,
            verification_level: &proof.verification_level,
            action: &self.action,
            signal_hash: signal_hash(signal),
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| HumanityError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!(%signal, "world id proof accepted");
            return Ok(nullifier);
        }
        if status.is_server_error() {
            return Err(HumanityError::Unavailable(format!("world id returned {status}")));
        }
        let rejection = resp.json::<VerifyRejection>().await.ok();
        let reason = rejection
            .and_then(|r| r.detail.or(r.code))
            .unwrap_or_else(|| status.to_string());
        warn!(%signal, %reason, "world id proof rejected");
        Err(HumanityError::Rejected(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_hash_fits_the_field() {
        let hash = signal_hash(Address::repeat_byte(0x42));
        assert_eq!(hash.len(), 66);
        // shifted right one byte, so the top byte is always zero
        assert!(hash.starts_with("0x00"));
    }

    #[test]
    fn nullifier_accepts_hex_and_decimal() {
        let mut proof = WorldIdProof {
            merkle_root: "0x1".into(),
            nullifier_hash: "0x2a".into(),
            proof: "0x".into(),
            verification_level: "orb".into(),
        };
        assert_eq!(proof.nullifier().unwrap(), U256::from(42u8));
        proof.nullifier_hash = "42".into();
        assert_eq!(proof.nullifier().unwrap(), U256::from(42u8));
        proof.nullifier_hash = "zz".into();
        assert!(matches!(proof.nullifier(), Err(HumanityError::Rejected(_))));
    }
}
