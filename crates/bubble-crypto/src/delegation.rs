//! Delegation signature recovery, expiry, and scope checking.

use alloy_primitives::{Address, B256, Signature as AlloySignature, keccak256};
use bubble_types::signature::{Delegation, DelegatedPermissions, Signature, SignatureKind};
use serde::Serialize;

use crate::eip712;

#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("delegation signature bytes could not be decoded")]
    Malformed,
    #[error("delegation has expired")]
    Expired,
    #[error("delegation does not cover this request's scope")]
    OutOfScope,
}

#[derive(Serialize)]
struct CanonicalDelegation<'a> {
    delegate: Address,
    expires: u64,
    permissions: &'a DelegatedPermissions,
}

fn eip191_digest(message: &[u8]) -> B256 {
    let mut buf = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    buf.extend_from_slice(message);
    keccak256(buf)
}

fn canonical_bytes(delegation: &Delegation) -> Vec<u8> {
    let canonical = CanonicalDelegation {
        delegate: delegation.delegate,
        expires: delegation.expires,
        permissions: &delegation.permissions,
    };
    serde_json::to_vec(&canonical).expect("CanonicalDelegation always serializes")
}

/// Recovers the address that signed `delegation`'s grant — the delegator,
/// i.e. the bubble user who is permitting `delegation.delegate` to act for
/// them.
pub fn recover_delegator(delegation: &Delegation) -> Result<Address, DelegationError> {
    let signature: Signature = delegation.signature.to_signature().map_err(|_| DelegationError::Malformed)?;
    let alloy_sig = AlloySignature::from_raw_array(&signature.bytes).map_err(|_| DelegationError::Malformed)?;
    let digest = match signature.kind {
        SignatureKind::Plain => keccak256(canonical_bytes(delegation)),
        SignatureKind::Eip191 => eip191_digest(&canonical_bytes(delegation)),
        SignatureKind::Eip712 => {
            let permissions_json =
                serde_json::to_string(&delegation.permissions).expect("permissions always serialize");
            eip712::delegation_signing_hash(delegation.delegate, delegation.expires, &permissions_json)
        }
    };
    alloy_sig.recover_address_from_prehash(&digest).map_err(|_| DelegationError::Malformed)
}

/// Verifies `delegation` is active at `now` and covers a request against
/// `(chain, contract, provider)`, returning the recovered delegator address
/// on success.
pub fn verify_delegation(
    delegation: &Delegation,
    now: u64,
    chain: u64,
    contract: Address,
    provider: &str,
) -> Result<Address, DelegationError> {
    if !delegation.is_active(now) {
        return Err(DelegationError::Expired);
    }
    if !delegation.permits(chain, contract, provider) {
        return Err(DelegationError::OutOfScope);
    }
    recover_delegator(delegation)
}
