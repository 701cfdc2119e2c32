//! Canonical serialization of the payload a Guardian request signature
//! actually covers.

use alloy_primitives::{B256, keccak256};
use bubble_types::rpc::envelope::CanonicalPayload;

/// Serializes `payload` the one way it is ever serialized for hashing:
/// `serde_json::to_vec` over the fixed-field-order struct, never a
/// `HashMap` or any other representation that could reorder fields.
pub fn canonical_bytes(payload: &CanonicalPayload<'_>) -> Vec<u8> {
    serde_json::to_vec(payload).expect("CanonicalPayload always serializes")
}

/// The EIP-191 `personal_sign` digest: `"\x19Ethereum Signed Message:\n" +
/// len(message) + message`, keccak256-hashed. Shared by request and
/// delegation signature recovery.
pub fn eip191_digest(message: &[u8]) -> B256 {
    let mut buf = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    buf.extend_from_slice(message);
    keccak256(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use bubble_types::GuardianMethod;
    use std::str::FromStr;

    #[test]
    fn field_order_is_stable_and_starts_with_method() {
        let contract = Address::from_str("0x1234567890abcdef1234567890abcdef12345678").unwrap();
        let payload = CanonicalPayload {
            method: GuardianMethod::Read,
            version: 1,
            timestamp: 1_700_000_000,
            nonce: "abc",
            chain_id: 1,
            contract,
            file: None,
            data: None,
            options: None,
        };
        let bytes = canonical_bytes(&payload);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"method":"read","version":1"#));
    }
}
