//! Signature recovery across the three signing schemes.

use alloy_primitives::{Address, B256, Signature as AlloySignature, keccak256};
use bubble_types::rpc::envelope::CanonicalPayload;
use bubble_types::signature::{Signature, SignatureKind};
use std::str::FromStr;

use crate::canonical::{canonical_bytes, eip191_digest};
use crate::eip712;

/// The literal `signatory` value a request may send to ask for anonymous,
/// unauthenticated access.
pub const PUBLIC_SENTINEL: &str = "public";

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("signature bytes could not be decoded")]
    Malformed,
    #[error("declared signatory is not a valid address")]
    InvalidSignatory,
    #[error("recovered signatory does not match the declared signatory")]
    Mismatch,
}

fn digest_for(kind: SignatureKind, payload: &CanonicalPayload<'_>) -> B256 {
    match kind {
        SignatureKind::Plain => keccak256(canonical_bytes(payload)),
        SignatureKind::Eip191 => eip191_digest(&canonical_bytes(payload)),
        SignatureKind::Eip712 => eip712::signing_hash(payload),
    }
}

/// Recovers the address that produced `signature` over `payload`, without
/// regard to who the request claims signed it.
pub fn recover_signatory(payload: &CanonicalPayload<'_>, signature: &Signature) -> Result<Address, RecoveryError> {
    let alloy_sig = AlloySignature::from_raw_array(&signature.bytes).map_err(|_| RecoveryError::Malformed)?;
    let digest = digest_for(signature.kind, payload);
    alloy_sig.recover_address_from_prehash(&digest).map_err(|_| RecoveryError::Malformed)
}

/// Resolves the effective signatory for a request, handling the `"public"`
/// sentinel: a request may declare `signatory: "public"` to ask
/// for anonymous access, in which case no signature is checked and a fresh
/// random address is returned. The Guardian then looks ACC permissions up
/// under that address exactly as it would for any signed request — an ACC
/// grants public access by answering any unrecognized address with its
/// default permission word, so a never-before-seen random address is
/// indistinguishable from "the general public" to the permission lookup.
///
/// Otherwise, the signature is recovered and checked against the declared
/// `signatory`.
pub fn recover_signatory_or_public(
    declared_signatory: &str,
    payload: &CanonicalPayload<'_>,
    signature: &Signature,
) -> Result<Address, RecoveryError> {
    if declared_signatory == PUBLIC_SENTINEL {
        return Ok(Address::random());
    }
    let declared = Address::from_str(declared_signatory).map_err(|_| RecoveryError::InvalidSignatory)?;
    let recovered = recover_signatory(payload, signature)?;
    if recovered != declared {
        return Err(RecoveryError::Mismatch);
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use bubble_types::GuardianMethod;

    fn sample_payload() -> CanonicalPayload<'static> {
        CanonicalPayload {
            method: GuardianMethod::Read,
            version: 1,
            timestamp: 1_700_000_000,
            nonce: "abc123",
            chain_id: 1,
            contract: Address::from_str("0x1234567890abcdef1234567890abcdef12345678").unwrap(),
            file: None,
            data: None,
            options: None,
        }
    }

    fn sign(kind: SignatureKind, signer: &PrivateKeySigner, payload: &CanonicalPayload<'_>) -> Signature {
        let digest = digest_for(kind, payload);
        let sig = signer.sign_hash_sync(&digest).unwrap();
        Signature::new(kind, sig.as_bytes())
    }

    #[test]
    fn plain_signature_recovers_the_signer() {
        let signer = PrivateKeySigner::random();
        let payload = sample_payload();
        let signature = sign(SignatureKind::Plain, &signer, &payload);
        let recovered = recover_signatory(&payload, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn eip191_signature_recovers_the_signer() {
        let signer = PrivateKeySigner::random();
        let payload = sample_payload();
        let signature = sign(SignatureKind::Eip191, &signer, &payload);
        let recovered = recover_signatory(&payload, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn eip712_signature_recovers_the_signer() {
        let signer = PrivateKeySigner::random();
        let payload = sample_payload();
        let signature = sign(SignatureKind::Eip712, &signer, &payload);
        let recovered = recover_signatory(&payload, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn declared_signatory_must_match_recovered_address() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let payload = sample_payload();
        let signature = sign(SignatureKind::Eip191, &signer, &payload);
        let err = recover_signatory_or_public(&other.address().to_string(), &payload, &signature).unwrap_err();
        assert!(matches!(err, RecoveryError::Mismatch));
    }

    #[test]
    fn public_sentinel_bypasses_signature_check() {
        let signer = PrivateKeySigner::random();
        let payload = sample_payload();
        let signature = sign(SignatureKind::Eip191, &signer, &payload);
        let a = recover_signatory_or_public(PUBLIC_SENTINEL, &payload, &signature).unwrap();
        let b = recover_signatory_or_public(PUBLIC_SENTINEL, &payload, &signature).unwrap();
        assert_ne!(a, b, "each public request should get a fresh synthetic address");
    }
}
