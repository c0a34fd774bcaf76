//! The closed error set of intent intake, and how component errors fold into it.

use alloy_primitives::{Address, U256};
use uuid::Uuid;

use crate::{
    chain::ChainError,
    contracts::decode_revert,
    humanity::HumanityError,
    nonce::NonceError,
    relayer::{FailureKind, RelayError},
    store::StoreError,
    verify::VerifyError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Replay,
    Resource,
    Execution,
    NotFound,
    Upstream,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("intent deadline {deadline} has passed (now {now})")]
    DeadlineExpired { deadline: u64, now: u64 },
    #[error("humanity proof rejected: {0}")]
    HumanityRejected(String),
    #[error("nonce {nonce} of {signer} was already used")]
    NonceAlreadyUsed {
        signer: Address,
        nonce: U256,
        relay_id: Option<Uuid>,
    },
    #[error("nonce {provided} is ahead of the expected {expected}")]
    NonceAhead { expected: U256, provided: U256 },
    #[error("relayer underfunded: {0}")]
    RelayerUnderfunded(String),
    #[error("relayer is busy, retry later")]
    RelayerBusy,
    #[error("execution reverted: {0}")]
    ChainRevert(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            IntentError::Validation(_) | IntentError::NonceAhead { .. } => ErrorCategory::Validation,
            IntentError::InvalidSignature(_)
            | IntentError::DeadlineExpired { .. }
            | IntentError::HumanityRejected(_) => ErrorCategory::Authentication,
            IntentError::NonceAlreadyUsed { .. } => ErrorCategory::Replay,
            IntentError::RelayerUnderfunded(_) | IntentError::RelayerBusy => ErrorCategory::Resource,
            IntentError::ChainRevert(_) => ErrorCategory::Execution,
            IntentError::NotFound(_) => ErrorCategory::NotFound,
            IntentError::Unavailable(_) => ErrorCategory::Upstream,
            IntentError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            IntentError::Validation(_) => "VALIDATION",
            IntentError::InvalidSignature(_) => "INVALID_SIGNATURE",
            IntentError::DeadlineExpired { .. } => "DEADLINE_EXPIRED",
            IntentError::HumanityRejected(_) => "HUMANITY_REJECTED",
            IntentError::NonceAlreadyUsed { .. } => "NONCE_ALREADY_USED",
            IntentError::NonceAhead { .. } => "NONCE_AHEAD",
            IntentError::RelayerUnderfunded(_) => "RELAYER_UNDERFUNDED",
            IntentError::RelayerBusy => "RELAYER_BUSY",
            IntentError::ChainRevert(_) => "CHAIN_REVERT",
            IntentError::NotFound(_) => "NOT_FOUND",
            IntentError::Unavailable(_) => "UPSTREAM_UNAVAILABLE",
            IntentError::Internal(_) => "INTERNAL",
        }
    }

    /// The error a caller sees for a relay that ended in FAILED.
    pub fn from_failure(kind: FailureKind, message: String, signer: Address, nonce: U256, relay_id: Uuid) -> Self {
        match kind {
            FailureKind::ChainRevert => IntentError::ChainRevert(message),
            FailureKind::NonceAlreadyUsed => IntentError::NonceAlreadyUsed {
                signer,
                nonce,
                relay_id: Some(relay_id),
            },
            FailureKind::RelayerUnderfunded => IntentError::RelayerUnderfunded(message),
            FailureKind::BroadcastFailed | FailureKind::Interrupted | FailureKind::Dropped => {
                IntentError::Unavailable(message)
            }
        }
    }
}

impl From<VerifyError> for IntentError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::InvalidSignature(reason) => IntentError::InvalidSignature(reason),
            VerifyError::DeadlineExpired { deadline, now } => IntentError::DeadlineExpired { deadline, now },
        }
    }
}

impl From<NonceError> for IntentError {
    fn from(err: NonceError) -> Self {
        match err {
            NonceError::AlreadyUsed { signer, nonce } => IntentError::NonceAlreadyUsed {
                signer,
                nonce,
                relay_id: None,
            },
            NonceError::Ahead { expected, provided, .. } => IntentError::NonceAhead { expected, provided },
            NonceError::Chain(e) => e.into(),
            NonceError::Store(e) => e.into(),
        }
    }
}

impl From<HumanityError> for IntentError {
    fn from(err: HumanityError) -> Self {
        match err {
            HumanityError::Rejected(reason) => IntentError::HumanityRejected(reason),
            HumanityError::Unavailable(reason) => IntentError::Unavailable(reason),
        }
    }
}

impl From<RelayError> for IntentError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Busy => IntentError::RelayerBusy,
            RelayError::Stopped => IntentError::Internal("relay worker has stopped".to_string()),
            RelayError::Chain(e) => e.into(),
            RelayError::Store(e) => e.into(),
        }
    }
}

impl From<ChainError> for IntentError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Reverted(data) => IntentError::ChainRevert(decode_revert(&data).message),
            other => IntentError::Unavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for IntentError {
    fn from(err: StoreError) -> Self {
        IntentError::Internal(err.to_string())
    }
}
