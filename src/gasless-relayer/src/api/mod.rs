//! HTTP surface: gasless intents, relay status and reward claims.

pub mod dto;
pub mod error;
pub mod gasless;
pub mod rewards;
pub mod state;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use self::{dto::HealthResponse, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/gasless/proposal-intent", post(gasless::proposal_intent))
        .route("/gasless/vote-intent", post(gasless::vote_intent))
        .route("/gasless/zap-intent", post(gasless::zap_intent))
        .route("/gasless/nonce", get(gasless::nonce))
        .route("/gasless/relay/:id", get(gasless::relay))
        .route("/rewards/claim-proof", post(rewards::claim_proof))
        .route("/rewards/claim", post(rewards::claim))
        .route("/rewards/claimable", get(rewards::claimable))
        .route("/rewards/distributions", post(rewards::create_distribution))
        .route("/rewards/distributions/:id/publish", post(rewards::publish_distribution));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}

/// Router with request tracing and, if enabled, permissive CORS.
pub fn create_app(state: AppState, enable_cors: bool) -> Router {
    let router = create_router(state).layer(TraceLayer::new_for_http());
    if enable_cors {
        router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    } else {
        router
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        relayer: state.relayer_address,
        chain_id: state.chain_id,
        queued: state.relayer.queued(),
    })
}
