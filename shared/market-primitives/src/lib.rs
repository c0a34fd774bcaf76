//! Shared primitives for the gasless relayer (relay path and off-chain tooling).
//!
//! Everything in here is pure and deterministic: the same inputs must produce the same bytes
//! that the deployed entrypoint and conditional-token contracts compute on-chain.

pub mod bytes;
pub mod ecdsa;
pub mod ids;
pub mod intents;
pub mod merkle;
pub mod serde_u256;
pub mod typed_data;

pub use ecdsa::{recover_signer, sign_digest, SignatureError};
pub use ids::{collection_id, condition_id, position_id, IdError, IndexSet};
pub use intents::{CastVote, CreateProposal, ExecuteZap, Intent, IntentKind, DOMAIN_NAME, DOMAIN_VERSION};
pub use typed_data::{Domain, Field, Schema};
