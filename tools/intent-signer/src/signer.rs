use std::fs;

use alloy_primitives::Bytes;
use anyhow::{anyhow, Context, Result};
use k256::ecdsa::SigningKey;
use market_primitives::{sign_digest, Domain, Intent};

/// Load a secp256k1 key from a file or an inline hex string (`0x` optional).
pub fn load_key(path: Option<&str>, inline: Option<&str>) -> Result<SigningKey> {
    let raw = match (path, inline) {
        (Some(path), _) => fs::read_to_string(path).with_context(|| format!("failed to read key file {path}"))?,
        (None, Some(key)) => key.to_string(),
        (None, None) => {
            return Err(anyhow!(
                "missing signer key: provide --private-key-path or --private-key (or set PRIV_KEY_PATH/PKEY)"
            ))
        }
    };
    let trimmed = raw.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed)).context("key is not valid hex")?;
    SigningKey::from_slice(&bytes).map_err(|_| anyhow!("key is not a valid secp256k1 scalar"))
}

/// Sign `intent` under `domain`, returning `r || s || v`.
pub fn sign_intent<I: Intent>(key: &SigningKey, domain: &Domain, intent: &I) -> Result<Bytes> {
    let digest = intent.signing_digest(domain);
    let sig = sign_digest(key, digest).map_err(|e| anyhow!("signing failed: {e}"))?;
    Ok(Bytes::copy_from_slice(&sig))
}
