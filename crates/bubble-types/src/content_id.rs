//! `ContentId` — the globally-unique identifier `{chain, contract, provider, file?}`.
//!
//! A `ContentId` binds a bubble's on-chain Access Control Contract to the
//! off-chain provider hosting it, and optionally names a file or directory
//! inside that bubble. It has three wire surface forms: a JSON object, a
//! base64url (no padding) string, and a `did:bubble:` DID. Parsing accepts
//! base64 (`+/=`) as well as base64url (`-_`) on input but rejects strings
//! that mix both alphabets — see the module-level test vectors.

use alloy_primitives::Address;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::path::Path;
use crate::rpc::error::GuardianErrorCode;

const DID_PREFIX: &str = "did:bubble:";

/// A globally-unique identifier for a bubble, or a file/directory within one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentId {
    pub chain: u64,
    pub contract: Address,
    pub provider: String,
    pub file: Option<Path>,
}

/// Errors that can occur while parsing or encoding a [`ContentId`].
#[derive(Debug, thiserror::Error)]
pub enum ContentIdError {
    #[error("invalid object field(s)")]
    InvalidObjectFields,
    #[error("not valid JSON: {0}")]
    MalformedJson(String),
    #[error("mixed base64 and base64url alphabets in content id")]
    MixedAlphabet,
    #[error("not a valid base64 or base64url string")]
    InvalidEncoding,
    #[error("unrecognized DID method (expected did:bubble:)")]
    UnknownDidMethod,
    #[error("provider must be a non-empty URI")]
    EmptyProvider,
}

impl ContentIdError {
    pub fn code(&self) -> GuardianErrorCode {
        GuardianErrorCode::InvalidContentId
    }
}

/// The JSON-object wire shape, field order fixed as `chain, contract,
/// provider, file?` (the `file` key is entirely absent, not `null`, when
/// there is no file).
#[derive(Debug, Serialize, Deserialize)]
struct ContentIdWire {
    chain: u64,
    contract: String,
    provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

enum DetectedAlphabet {
    Base64,
    Base64Url,
}

/// Classifies a base64-ish string by character class: presence of
/// `+`, `/` or `=` marks standard base64; presence of `-` or `_` marks
/// base64url; both present is a hard rejection.
fn detect_alphabet(s: &str) -> Result<DetectedAlphabet, ContentIdError> {
    let has_std = s.contains(['+', '/', '=']);
    let has_url = s.contains(['-', '_']);
    match (has_std, has_url) {
        (true, true) => Err(ContentIdError::MixedAlphabet),
        (true, false) => Ok(DetectedAlphabet::Base64),
        (false, true) => Ok(DetectedAlphabet::Base64Url),
        (false, false) => Ok(DetectedAlphabet::Base64Url),
    }
}

fn decode_base64ish(s: &str) -> Result<Vec<u8>, ContentIdError> {
    match detect_alphabet(s)? {
        DetectedAlphabet::Base64 => STANDARD_NO_PAD
            .decode(s.trim_end_matches('='))
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(s))
            .map_err(|_| ContentIdError::InvalidEncoding),
        DetectedAlphabet::Base64Url => URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ContentIdError::InvalidEncoding),
    }
}

impl ContentId {
    pub fn new(chain: u64, contract: Address, provider: impl Into<String>) -> Self {
        ContentId {
            chain,
            contract,
            provider: provider.into(),
            file: None,
        }
    }

    /// Returns a copy of this `ContentId` with `file` set.
    pub fn set_file(&self, file: Path) -> Self {
        let mut next = self.clone();
        next.file = Some(file);
        next
    }

    fn from_wire(wire: ContentIdWire) -> Result<Self, ContentIdError> {
        if wire.provider.is_empty() {
            return Err(ContentIdError::EmptyProvider);
        }
        let contract = Address::from_str(&wire.contract)
            .map_err(|_| ContentIdError::InvalidObjectFields)?;
        let file = wire
            .file
            .map(|f| Path::parse(&f))
            .transpose()
            .map_err(|_| ContentIdError::InvalidObjectFields)?;
        Ok(ContentId {
            chain: wire.chain,
            contract,
            provider: wire.provider,
            file,
        })
    }

    fn from_json_str(s: &str) -> Result<Self, ContentIdError> {
        let wire: ContentIdWire = serde_json::from_str(s)
            .map_err(|_| ContentIdError::InvalidObjectFields)?;
        Self::from_wire(wire)
    }

    /// Parses a `ContentId` from any of its three wire surface forms: a JSON
    /// object string, a base64url/base64 encoded JSON string, or a
    /// `did:bubble:<base64url>` DID. Any other `did:*` prefix is a hard
    /// rejection distinct from "not a base64 string" (§4.1).
    pub fn parse(input: &str) -> Result<Self, ContentIdError> {
        let trimmed = input.trim();
        if let Some(rest) = trimmed.strip_prefix(DID_PREFIX) {
            let bytes =
                URL_SAFE_NO_PAD.decode(rest).map_err(|_| ContentIdError::InvalidEncoding)?;
            let json = String::from_utf8(bytes).map_err(|_| ContentIdError::InvalidEncoding)?;
            return Self::from_json_str(&json);
        }
        if trimmed.starts_with("did:") {
            return Err(ContentIdError::UnknownDidMethod);
        }
        if trimmed.starts_with('{') {
            return Self::from_json_str(trimmed);
        }
        let bytes = decode_base64ish(trimmed)?;
        let json = String::from_utf8(bytes).map_err(|_| ContentIdError::InvalidEncoding)?;
        Self::from_json_str(&json)
    }

    fn wire(&self) -> ContentIdWire {
        ContentIdWire {
            chain: self.chain,
            contract: format!("{:#x}", self.contract),
            provider: self.provider.clone(),
            file: self.file.as_ref().map(|p| p.as_str().to_string()),
        }
    }

    /// Returns the JSON object surface form.
    pub fn to_object(&self) -> serde_json::Value {
        serde_json::to_value(self.wire()).expect("ContentIdWire always serializes")
    }

    /// Encodes as base64url (no padding) of the UTF-8 JSON serialization.
    pub fn to_string(&self) -> String {
        let json = serde_json::to_string(&self.wire()).expect("ContentIdWire always serializes");
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    /// Encodes as a `did:bubble:` DID.
    pub fn to_did(&self) -> String {
        format!("{DID_PREFIX}{}", self.to_string())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentId::parse(s)
    }
}
