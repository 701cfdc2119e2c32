//! The JSON-RPC 2.0 request/response envelope.
//!
//! `RequestParams` doubles as the shape the canonical signing payload is
//! drawn from (`bubble-crypto::canonical` projects it, plus the enclosing
//! method name, into a fixed-field-order byte string) — the signature never
//! covers a free-form map.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rpc::error::GuardianErrorCode;
use crate::rpc::method::GuardianMethod;
use crate::signature::{Delegation, SignatureEnvelope};

/// The method-agnostic parameter set every Guardian request carries.
///
/// `file` is the raw path string rather than a parsed [`crate::Path`] so
/// that what gets hashed is exactly the bytes the client sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    pub version: u32,
    pub timestamp: u64,
    pub nonce: String,
    pub chain_id: u64,
    pub contract: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    pub signatory: String,
    pub signature: SignatureEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate: Option<Delegation>,
}

/// The fixed-field-order payload that is actually signed: the enclosing
/// method name plus every `RequestParams` field that isn't itself about the
/// signature or the signatory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPayload<'a> {
    pub method: GuardianMethod,
    pub version: u32,
    pub timestamp: u64,
    pub nonce: &'a str,
    pub chain_id: u64,
    pub contract: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'a Value>,
}

impl RequestParams {
    /// Projects this request onto the payload that was actually signed.
    pub fn canonical_payload(&self, method: GuardianMethod) -> CanonicalPayload<'_> {
        CanonicalPayload {
            method,
            version: self.version,
            timestamp: self.timestamp,
            nonce: &self.nonce,
            chain_id: self.chain_id,
            contract: self.contract,
            file: self.file.as_deref(),
            data: self.data.as_deref(),
            options: self.options.as_ref(),
        }
    }
}

/// A JSON-RPC 2.0 request envelope carrying a [`GuardianMethod`] and its
/// [`RequestParams`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub jsonrpc: String,
    pub id: Value,
    pub method: GuardianMethod,
    pub params: RequestParams,
}

impl RequestEnvelope {
    pub const JSONRPC_VERSION: &'static str = "2.0";
}

/// The wire shape of a JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn from_code(code: GuardianErrorCode, data: Option<Value>) -> Self {
        RpcError {
            code: code.code(),
            message: code.to_string(),
            data,
        }
    }
}

/// A JSON-RPC 2.0 response envelope: exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ResponseEnvelope {
    pub fn success(id: Value, result: Value) -> Self {
        ResponseEnvelope {
            jsonrpc: RequestEnvelope::JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: GuardianErrorCode, data: Option<Value>) -> Self {
        ResponseEnvelope {
            jsonrpc: RequestEnvelope::JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError::from_code(code, data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_params() -> RequestParams {
        RequestParams {
            version: 1,
            timestamp: 1_700_000_000,
            nonce: "abc123".to_string(),
            chain_id: 1,
            contract: Address::from_str("0x1234567890abcdef1234567890abcdef12345678").unwrap(),
            file: Some("0".repeat(64)),
            data: None,
            options: None,
            signatory: "0xabc".to_string(),
            signature: SignatureEnvelope {
                kind: crate::signature::SignatureKind::Eip191,
                signature: format!("0x{}{}{}", "11".repeat(32), "22".repeat(32), "1b"),
            },
            delegate: None,
        }
    }

    #[test]
    fn canonical_payload_omits_signature_and_signatory() {
        let params = sample_params();
        let payload = params.canonical_payload(GuardianMethod::Read);
        let json = serde_json::to_value(&payload).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|s| s.as_str()).collect();
        assert!(!keys.contains(&"signature"));
        assert!(!keys.contains(&"signatory"));
        assert!(!keys.contains(&"delegate"));
        assert_eq!(keys[0], "method");
    }

    #[test]
    fn request_envelope_round_trips() {
        let envelope = RequestEnvelope {
            jsonrpc: RequestEnvelope::JSONRPC_VERSION.to_string(),
            id: Value::from(1),
            method: GuardianMethod::Read,
            params: sample_params(),
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, GuardianMethod::Read);
        assert_eq!(parsed.params.nonce, "abc123");
    }

    #[test]
    fn success_and_error_responses_are_mutually_exclusive_on_the_wire() {
        let ok = ResponseEnvelope::success(Value::from(1), Value::from("done"));
        let ok_json = serde_json::to_value(&ok).unwrap();
        assert!(ok_json.get("error").is_none());

        let err = ResponseEnvelope::error(Value::from(1), GuardianErrorCode::PermissionDenied, None);
        let err_json = serde_json::to_value(&err).unwrap();
        assert!(err_json.get("result").is_none());
        assert_eq!(err_json["error"]["code"], -32002);
    }
}
