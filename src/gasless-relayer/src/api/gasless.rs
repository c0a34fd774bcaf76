//! Gasless intent endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{
    dto::{
        AddressQuery, NonceResponse, ProposalIntentRequest, RelayResponse, RelayView, VoteIntentRequest,
        ZapIntentRequest,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};
use crate::{
    errors::IntentError,
    relayer::{RelaySnapshot, RelayTicket},
    store::RelayStatus,
};

/// Submit a signed `CreateProposal` intent
pub async fn proposal_intent(
    State(state): State<AppState>,
    Json(req): Json<ProposalIntentRequest>,
) -> ApiResult<(StatusCode, Json<RelayResponse>)> {
    let ticket = state
        .intake
        .submit_proposal(req.intent.clone(), &req.signature, req.chain_id)
        .await?;
    settle(&state, ticket, req.intent.proposer, req.intent.nonce).await
}

/// Submit a signed `CastVote` intent with its World ID proof
pub async fn vote_intent(
    State(state): State<AppState>,
    Json(req): Json<VoteIntentRequest>,
) -> ApiResult<(StatusCode, Json<RelayResponse>)> {
    let intent = req.intent();
    let ticket = state
        .intake
        .submit_vote(intent.clone(), &req.signature, &req.world_id_proof, req.chain_id)
        .await?;
    settle(&state, ticket, intent.voter, intent.nonce).await
}

/// Submit a signed `Zap` intent
pub async fn zap_intent(
    State(state): State<AppState>,
    Json(req): Json<ZapIntentRequest>,
) -> ApiResult<(StatusCode, Json<RelayResponse>)> {
    let ticket = state
        .intake
        .submit_zap(req.intent.clone(), &req.signature, req.chain_id)
        .await?;
    settle(&state, ticket, req.intent.user, req.intent.nonce).await
}

pub async fn nonce(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> ApiResult<Json<NonceResponse>> {
    let nonce = state.intake.nonce(query.address).await?;
    Ok(Json(NonceResponse {
        address: query.address,
        nonce,
    }))
}

pub async fn relay(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<RelayView>> {
    match state.intake.relay(id)? {
        Some(record) => Ok(Json(record.into())),
        None => Err(ApiError::NotFound(format!("relay {id}"))),
    }
}

/// Wait a bounded time for the relay to settle. Still in flight answers 202 with what is known.
async fn settle(
    state: &AppState,
    mut ticket: RelayTicket,
    signer: alloy_primitives::Address,
    nonce: alloy_primitives::U256,
) -> ApiResult<(StatusCode, Json<RelayResponse>)> {
    let snapshot = ticket.wait_final(state.response_wait).await;
    match snapshot {
        RelaySnapshot {
            status: RelayStatus::Confirmed,
            ..
        } => Ok((StatusCode::OK, Json(snapshot.into()))),
        RelaySnapshot {
            status: RelayStatus::Failed,
            failure: Some((kind, message)),
            id,
            ..
        } => Err(IntentError::from_failure(kind, message, signer, nonce, id).into()),
        RelaySnapshot {
            status: RelayStatus::Failed,
            ..
        } => Err(IntentError::Internal("relay failed without a recorded reason".into()).into()),
        _ => Ok((StatusCode::ACCEPTED, Json(snapshot.into()))),
    }
}
