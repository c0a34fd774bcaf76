//! Command line and environment configuration.

use std::{fs, net::SocketAddr, path::PathBuf, time::Duration};

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use market_primitives::serde_u256;

use crate::relayer::RelaySettings;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Relay signed prediction-market intents and serve reward proofs")]
pub struct Config {
    /// JSON-RPC endpoint of the chain the entrypoint lives on.
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: String,

    /// Path to a file containing the relayer hot wallet key.
    #[arg(long, env = "RELAYER_KEY_PATH", conflicts_with = "relayer_key")]
    pub relayer_key_path: Option<PathBuf>,

    /// Relayer hot wallet key (hex string, 0x...).
    #[arg(long, env = "RELAYER_KEY", conflicts_with = "relayer_key_path", hide_env_values = true)]
    pub relayer_key: Option<String>,

    /// Chain id the typed-data domain is bound to. Checked against the node at startup.
    #[arg(long, env = "CHAIN_ID")]
    pub chain_id: u64,

    /// Gasless entrypoint (typed-data verifying contract).
    #[arg(long, env = "ENTRYPOINT_ADDRESS")]
    pub entrypoint: Address,

    /// Collateral token zaps buy positions in.
    #[arg(long, env = "COLLATERAL_TOKEN")]
    pub collateral_token: Address,

    #[arg(long, env = "DATABASE_PATH", default_value = "relayer.db")]
    pub database_path: PathBuf,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Minimum relayer balance (wei) below which intents are refused.
    #[arg(long, env = "MIN_RELAYER_BALANCE", default_value = "10000000000000000", value_parser = serde_u256::parse)]
    pub min_relayer_balance: U256,

    #[arg(long, env = "GAS_HEADROOM_PCT", default_value_t = 25)]
    pub gas_headroom_pct: u64,

    #[arg(long, env = "RELAY_QUEUE_CAPACITY", default_value_t = 256)]
    pub queue_capacity: usize,

    #[arg(long, env = "BROADCAST_TIMEOUT_SECS", default_value_t = 10)]
    pub broadcast_timeout_secs: u64,

    #[arg(long, env = "BROADCAST_RETRIES", default_value_t = 3)]
    pub broadcast_retries: u32,

    #[arg(long, env = "RECEIPT_POLL_MS", default_value_t = 2000)]
    pub receipt_poll_ms: u64,

    #[arg(long, env = "REBROADCAST_SECS", default_value_t = 30)]
    pub rebroadcast_secs: u64,

    /// How long a tracker waits for a receipt before leaving the relay to reconciliation.
    #[arg(long, env = "CONFIRMATION_TIMEOUT_SECS", default_value_t = 180)]
    pub confirmation_timeout_secs: u64,

    /// How long an HTTP request waits for its relay to settle before answering 202.
    #[arg(long, env = "RESPONSE_WAIT_SECS", default_value_t = 30)]
    pub response_wait_secs: u64,

    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value_t = 60)]
    pub reconcile_interval_secs: u64,

    #[arg(long, env = "WORLD_ID_API", default_value = "https://developer.worldcoin.org")]
    pub world_id_api: String,

    #[arg(long, env = "WORLD_ID_APP_ID")]
    pub world_id_app_id: String,

    #[arg(long, env = "WORLD_ID_ACTION", default_value = "vote")]
    pub world_id_action: String,

    #[arg(long, env = "WORLD_ID_TIMEOUT_SECS", default_value_t = 10)]
    pub world_id_timeout_secs: u64,

    /// Bearer token for distribution management. Unset disables those routes.
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    #[arg(long, env = "ENABLE_CORS", default_value_t = false)]
    pub enable_cors: bool,
}

impl Config {
    /// Hot wallet key, from the key file if given, else the inline value.
    pub fn relayer_key(&self) -> Result<String> {
        if let Some(path) = &self.relayer_key_path {
            let key = fs::read_to_string(path)
                .with_context(|| format!("failed to read relayer key from {}", path.display()))?;
            Ok(key.trim().to_string())
        } else if let Some(key) = &self.relayer_key {
            Ok(key.trim().to_string())
        } else {
            Err(anyhow!(
                "missing relayer key: provide --relayer-key-path or --relayer-key (or set RELAYER_KEY_PATH/RELAYER_KEY)"
            ))
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            min_relayer_balance: self.min_relayer_balance,
            gas_headroom_pct: self.gas_headroom_pct,
            queue_capacity: self.queue_capacity.max(1),
            broadcast_timeout: Duration::from_secs(self.broadcast_timeout_secs),
            broadcast_retries: self.broadcast_retries,
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_ms),
            rebroadcast_interval: Duration::from_secs(self.rebroadcast_secs),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            ..RelaySettings::new(self.entrypoint, self.collateral_token)
        }
    }

    pub fn response_wait(&self) -> Duration {
        Duration::from_secs(self.response_wait_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &[&str] = &[
        "gasless-relayer",
        "--rpc-url",
        "http://localhost:8545",
        "--chain-id",
        "480",
        "--entrypoint",
        "0x1111111111111111111111111111111111111111",
        "--collateral-token",
        "0x2222222222222222222222222222222222222222",
        "--world-id-app-id",
        "app_test",
    ];

    fn parse(extra: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(BASE.iter().chain(extra.iter()))
    }

    #[test]
    fn defaults_build_relay_settings() {
        let cfg = parse(&["--relayer-key", "0xabc"]).unwrap();
        let settings = cfg.relay_settings();
        assert_eq!(settings.gas_headroom_pct, 25);
        assert_eq!(settings.queue_capacity, 256);
        assert_eq!(settings.min_relayer_balance, U256::from(10_000_000_000_000_000u64));
        assert_eq!(settings.entrypoint, cfg.entrypoint);
        assert_eq!(cfg.relayer_key().unwrap(), "0xabc");
    }

    #[test]
    fn key_sources_conflict() {
        assert!(parse(&["--relayer-key", "0xabc", "--relayer-key-path", "/tmp/key"]).is_err());
    }

    #[test]
    fn balance_accepts_hex() {
        let cfg = parse(&["--relayer-key", "0xabc", "--min-relayer-balance", "0x10"]).unwrap();
        assert_eq!(cfg.min_relayer_balance, U256::from(16u8));
    }
}
