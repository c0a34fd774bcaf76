//! Request bodies for the relayer's gasless endpoints.

use alloy_primitives::Bytes;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

/// Flatten `intent` and attach the signature and chain id.
pub fn intent_body<T: Serialize>(intent: &T, signature: &Bytes, chain_id: u64) -> Result<Value> {
    let mut body = serde_json::to_value(intent).context("intent is not serializable")?;
    let obj = body.as_object_mut().context("intent must serialize to an object")?;
    obj.insert("signature".into(), json!(signature));
    obj.insert("chainId".into(), json!(chain_id));
    Ok(body)
}

/// The vote endpoint names the voter `signerAddress` and carries the World ID proof.
pub fn vote_body(
    intent: &market_primitives::CastVote,
    signature: &Bytes,
    chain_id: u64,
    world_id_proof: Option<Value>,
) -> Result<Value> {
    let mut body = intent_body(intent, signature, chain_id)?;
    let obj = body.as_object_mut().context("intent must serialize to an object")?;
    if let Some(voter) = obj.remove("voter") {
        obj.insert("signerAddress".into(), voter);
    }
    if let Some(proof) = world_id_proof {
        obj.insert("worldIdProof".into(), proof);
    }
    Ok(body)
}
