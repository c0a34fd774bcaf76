//! Reward distribution endpoints

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, U256};
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{
    dto::{
        AddressQuery, ClaimProofResponse, ClaimRequest, ClaimableResponse, CreateDistributionRequest,
        DistributionResponse,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};
use crate::{rewards::DistributionError, store::DistributionStatus, unix_now};

/// Proof for a claim, without recording it
pub async fn claim_proof(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimProofResponse>> {
    let proof = state.rewards.prove_for(req.distribution_id, req.address)?;
    Ok(Json(proof.into()))
}

/// Record the claim and return its proof
pub async fn claim(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimProofResponse>> {
    match state.rewards.claim(req.distribution_id, req.address, unix_now()) {
        Ok(proof) => Ok(Json(proof.into())),
        Err(DistributionError::AlreadyClaimed) => Err(ApiError::Conflict {
            code: "ALREADY_CLAIMED",
            message: "rewards already claimed".into(),
        }),
        Err(e) => Err(e.into()),
    }
}

pub async fn claimable(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> ApiResult<Json<ClaimableResponse>> {
    let rewards = state.rewards.claimable_for(query.address, unix_now())?;
    let total_claimable = rewards
        .iter()
        .fold(U256::ZERO, |acc, r| acc.saturating_add(r.amount));
    Ok(Json(ClaimableResponse {
        count: rewards.len(),
        total_claimable,
        rewards: rewards.into_iter().map(Into::into).collect(),
    }))
}

pub async fn create_distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDistributionRequest>,
) -> ApiResult<(StatusCode, Json<DistributionResponse>)> {
    authorize(&state, &headers)?;
    let mut leaves = BTreeMap::new();
    for (addr, amount) in req.leaves {
        let addr: Address = addr
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid leaf address {addr:?}")))?;
        if leaves.insert(addr, amount.0).is_some() {
            return Err(ApiError::BadRequest(format!("duplicate leaf address {addr}")));
        }
    }
    let id = state
        .rewards
        .create_draft(leaves, req.period_start, req.period_end, req.expires_at)?;
    Ok((
        StatusCode::CREATED,
        Json(DistributionResponse {
            distribution_id: id,
            merkle_root: None,
            status: DistributionStatus::Draft,
        }),
    ))
}

pub async fn publish_distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DistributionResponse>> {
    authorize(&state, &headers)?;
    let root = state.rewards.publish(id)?;
    Ok(Json(DistributionResponse {
        distribution_id: id,
        merkle_root: Some(root),
        status: DistributionStatus::Published,
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Forbidden("distribution management is disabled".into()));
    };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token_matches(token, expected) => Ok(()),
        _ => Err(ApiError::Unauthorized("missing or invalid admin token".into())),
    }
}

/// Compares fixed-width digests in constant time, so neither content nor length leaks.
fn token_matches(provided: &str, expected: &str) -> bool {
    keccak256(provided.as_bytes())
        .as_slice()
        .ct_eq(keccak256(expected.as_bytes()).as_slice())
        .into()
}

#[cfg(test)]
mod tests {
    use super::token_matches;

    #[test]
    fn admin_token_comparison() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cres", "s3cret"));
        assert!(!token_matches("s3cret-longer", "s3cret"));
        assert!(!token_matches("", "s3cret"));
    }
}
