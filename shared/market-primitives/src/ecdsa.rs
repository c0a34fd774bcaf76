//! secp256k1 signing and signer recovery over 32-byte digests.
//!
//! Signatures are the usual 65-byte `r || s || v`. We accept v in {0,1,27,28} and reject
//! high-S signatures, matching OpenZeppelin's `ECDSA.recover`.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature must be 65 bytes, got {0}")]
    BadLength(usize),
    #[error("unsupported recovery byte {0}")]
    BadRecoveryByte(u8),
    #[error("malleable signature (high s)")]
    HighS,
    #[error("malformed r/s values")]
    Malformed,
    #[error("public key recovery failed")]
    RecoveryFailed,
    #[error("signing failed")]
    SigningFailed,
}

/// Recover the EOA that produced `sig` over `digest`.
pub fn recover_signer(digest: B256, sig: &[u8]) -> Result<Address, SignatureError> {
    if sig.len() != 65 {
        return Err(SignatureError::BadLength(sig.len()));
    }
    let v = match sig[64] {
        0 | 1 => sig[64],
        27 | 28 => sig[64] - 27,
        other => return Err(SignatureError::BadRecoveryByte(other)),
    };
    let signature = Signature::from_slice(&sig[..64]).map_err(|_| SignatureError::Malformed)?;
    if signature.normalize_s().is_some() {
        return Err(SignatureError::HighS);
    }
    let recovery_id = RecoveryId::from_byte(v).ok_or(SignatureError::BadRecoveryByte(sig[64]))?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_of(&key))
}

/// Sign `digest` and return `r || s || v` with v in {27, 28}.
pub fn sign_digest(key: &SigningKey, digest: B256) -> Result<[u8; 65], SignatureError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|_| SignatureError::SigningFailed)?;
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = 27 + recovery_id.to_byte();
    Ok(out)
}

/// Ethereum address of a public key: low 20 bytes of `keccak256(X || Y)`.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn sign_then_recover() {
        let signer = key(7);
        let digest = keccak256(b"digest");
        let sig = sign_digest(&signer, digest).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
        assert_eq!(recover_signer(digest, &sig).unwrap(), address_of(signer.verifying_key()));
    }

    #[test]
    fn zero_one_recovery_bytes_are_accepted() {
        let signer = key(9);
        let digest = keccak256(b"v-normalisation");
        let mut sig = sign_digest(&signer, digest).unwrap();
        sig[64] -= 27;
        assert_eq!(recover_signer(digest, &sig).unwrap(), address_of(signer.verifying_key()));
    }

    #[test]
    fn wrong_digest_recovers_someone_else() {
        let signer = key(7);
        let sig = sign_digest(&signer, keccak256(b"a")).unwrap();
        let recovered = recover_signer(keccak256(b"b"), &sig);
        assert_ne!(recovered.ok(), Some(address_of(signer.verifying_key())));
    }

    #[test]
    fn malformed_signatures_fail_closed() {
        let digest = keccak256(b"x");
        assert_eq!(recover_signer(digest, &[0u8; 64]), Err(SignatureError::BadLength(64)));
        let mut sig = sign_digest(&key(3), digest).unwrap();
        sig[64] = 30;
        assert_eq!(recover_signer(digest, &sig), Err(SignatureError::BadRecoveryByte(30)));
    }

    #[test]
    fn high_s_is_rejected() {
        let digest = keccak256(b"malleable");
        let sig = sign_digest(&key(5), digest).unwrap();
        // secp256k1 group order n; s' = n - s is the mirrored (high) s.
        let n = alloy_primitives::U256::from_str_radix(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
            16,
        )
        .unwrap();
        let s = alloy_primitives::U256::from_be_slice(&sig[32..64]);
        let mut malleable = sig;
        malleable[32..64].copy_from_slice(&(n - s).to_be_bytes::<32>());
        malleable[64] = if sig[64] == 27 { 28 } else { 27 };
        assert_eq!(recover_signer(digest, &malleable), Err(SignatureError::HighS));
    }
}
