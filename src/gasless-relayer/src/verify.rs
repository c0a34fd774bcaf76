//! Signature verification of typed intents against the configured domain.

use alloy_primitives::B256;
use market_primitives::{recover_signer, Domain, Intent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("deadline {deadline} has passed (now {now})")]
    DeadlineExpired { deadline: u64, now: u64 },
}

#[derive(Clone, Debug)]
pub struct Verifier {
    domain: Domain,
}

impl Verifier {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Check `signature` over `intent` and return the intent reference (its signing digest).
    ///
    /// A chain id supplied with the request must match the configured domain; the digest is always
    /// computed over the configured domain, never over caller-provided values.
    pub fn verify<I: Intent>(
        &self,
        intent: &I,
        signature: &[u8],
        requested_chain_id: Option<u64>,
        now: u64,
    ) -> Result<B256, VerifyError> {
        if let Some(chain_id) = requested_chain_id {
            if chain_id != self.domain.chain_id {
                return Err(VerifyError::InvalidSignature(format!(
                    "signed for chain {chain_id}, relayer serves chain {}",
                    self.domain.chain_id
                )));
            }
        }

        let digest = intent.signing_digest(&self.domain);
        let recovered =
            recover_signer(digest, signature).map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;
        if recovered != intent.signer() {
            return Err(VerifyError::InvalidSignature(format!(
                "recovered {recovered}, expected {}",
                intent.signer()
            )));
        }

        if intent.deadline() < now {
            return Err(VerifyError::DeadlineExpired {
                deadline: intent.deadline(),
                now,
            });
        }
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use k256::ecdsa::SigningKey;
    use market_primitives::{ecdsa::address_of, sign_digest, CastVote};

    fn key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    fn domain() -> Domain {
        Domain::new("PredictionMarketRelay", "1", 480, Address::repeat_byte(0xee))
    }

    fn vote(voter: Address) -> CastVote {
        CastVote {
            proposal_id: U256::from(1u8),
            support: true,
            voter,
            nonce: U256::from(5u8),
            deadline: 2_000,
        }
    }

    #[test]
    fn accepts_a_valid_signature() {
        let key = key();
        let intent = vote(address_of(key.verifying_key()));
        let verifier = Verifier::new(domain());
        let sig = sign_digest(&key, intent.signing_digest(verifier.domain())).unwrap();

        let intent_ref = verifier.verify(&intent, &sig, Some(480), 1_000).unwrap();
        assert_eq!(intent_ref, intent.signing_digest(&domain()));
    }

    #[test]
    fn rejects_tampered_fields_and_foreign_domains() {
        let key = key();
        let intent = vote(address_of(key.verifying_key()));
        let verifier = Verifier::new(domain());
        let sig = sign_digest(&key, intent.signing_digest(verifier.domain())).unwrap();

        let flipped = CastVote {
            support: false,
            ..intent.clone()
        };
        assert!(matches!(
            verifier.verify(&flipped, &sig, None, 1_000),
            Err(VerifyError::InvalidSignature(_))
        ));

        assert!(matches!(
            verifier.verify(&intent, &sig, Some(1), 1_000),
            Err(VerifyError::InvalidSignature(_))
        ));

        let other = Verifier::new(Domain::new("PredictionMarketRelay", "1", 480, Address::repeat_byte(0xef)));
        assert!(other.verify(&intent, &sig, None, 1_000).is_err());
    }

    #[test]
    fn rejects_expired_and_malformed() {
        let key = key();
        let intent = vote(address_of(key.verifying_key()));
        let verifier = Verifier::new(domain());
        let sig = sign_digest(&key, intent.signing_digest(verifier.domain())).unwrap();

        assert_eq!(
            verifier.verify(&intent, &sig, None, 2_001),
            Err(VerifyError::DeadlineExpired {
                deadline: 2_000,
                now: 2_001
            })
        );
        assert!(matches!(
            verifier.verify(&intent, &sig[..64], None, 1_000),
            Err(VerifyError::InvalidSignature(_))
        ));
    }
}
