//! EIP-712 typed-data hashing for `Eip712`-scheme request signatures.
//!
//! Every Guardian deployment shares one fixed domain (`name: "BubbleProtocol"`,
//! `version: "1.0"`) rather than one domain per Access Control Contract — the
//! chain id is still bound into the domain, so a signature for one chain
//! cannot be replayed against another.

use alloy_primitives::{Address, B256, address};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};
use bubble_types::rpc::envelope::CanonicalPayload;

sol! {
    #[derive(Debug)]
    struct BubbleDataRequest {
        string purpose;
        uint256 version;
        string method;
        uint256 timestamp;
        string nonce;
        uint256 chainId;
        address contract;
        string file;
        string data;
        string options;
    }
}

sol! {
    #[derive(Debug)]
    struct BubbleDelegate {
        string purpose;
        address delegate;
        uint256 expires;
        string permissions;
    }
}

const REQUEST_PURPOSE: &str = "To authorise this Bubble Protocol request I am signing its content";
const DELEGATE_PURPOSE: &str = "I am authorising the following address to act on my behalf";

const VERIFYING_CONTRACT: Address = address!("0x0000000000000000000000000000000000000000");

/// Builds the fixed Bubble Protocol EIP-712 domain for `chain_id`.
pub fn domain(chain_id: u64) -> Eip712Domain {
    eip712_domain! {
        name: "BubbleProtocol",
        version: "1.0",
        chain_id: chain_id,
        verifying_contract: VERIFYING_CONTRACT,
    }
}

/// Projects a [`CanonicalPayload`] onto the EIP-712 typed struct and returns
/// its signing hash under the domain for `payload.chain_id`.
pub fn signing_hash(payload: &CanonicalPayload<'_>) -> B256 {
    let typed = BubbleDataRequest {
        purpose: REQUEST_PURPOSE.to_string(),
        version: alloy_primitives::U256::from(payload.version),
        method: payload.method.as_str().to_string(),
        timestamp: alloy_primitives::U256::from(payload.timestamp),
        nonce: payload.nonce.to_string(),
        chainId: alloy_primitives::U256::from(payload.chain_id),
        contract: payload.contract,
        file: payload.file.unwrap_or_default().to_string(),
        data: payload.data.unwrap_or_default().to_string(),
        options: payload
            .options
            .map(|v| v.to_string())
            .unwrap_or_else(|| "{}".to_string()),
    };
    typed.eip712_signing_hash(&domain(payload.chain_id))
}

/// A delegation's signature is not bound to any one chain (its scopes may
/// span several), so it is signed under chain id `0` in the same fixed
/// domain rather than the chain id of whichever request later relies on it.
pub fn delegation_signing_hash(delegate: Address, expires: u64, permissions_json: &str) -> B256 {
    let typed = BubbleDelegate {
        purpose: DELEGATE_PURPOSE.to_string(),
        delegate,
        expires: alloy_primitives::U256::from(expires),
        permissions: permissions_json.to_string(),
    };
    typed.eip712_signing_hash(&domain(0))
}
