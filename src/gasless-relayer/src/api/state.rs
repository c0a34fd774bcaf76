//! Application state for the API server

use std::{sync::Arc, time::Duration};

use alloy_primitives::Address;

use crate::{intake::Intake, relayer::RelayerHandle, rewards::Rewards};

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<Intake>,
    pub rewards: Rewards,
    /// Used for queue depth in health reports.
    pub relayer: RelayerHandle,
    pub relayer_address: Address,
    pub chain_id: u64,
    /// How long a mutating request waits for its relay to settle before answering 202.
    pub response_wait: Duration,
    /// Bearer token for distribution management. `None` disables those routes.
    pub admin_token: Option<String>,
    pub version: String,
}

impl AppState {
    pub fn new(
        intake: Arc<Intake>,
        rewards: Rewards,
        relayer: RelayerHandle,
        relayer_address: Address,
        chain_id: u64,
    ) -> Self {
        Self {
            intake,
            rewards,
            relayer,
            relayer_address,
            chain_id,
            response_wait: Duration::from_secs(30),
            admin_token: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_response_wait(mut self, wait: Duration) -> Self {
        self.response_wait = wait;
        self
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty());
        self
    }
}
