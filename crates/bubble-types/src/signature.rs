//! Signatures and one-level delegation grants.
//!
//! A request is authorized either by the bubble user's own signature, or by
//! a [`Delegation`] the user previously signed naming a delegate and a
//! [`Scope`] restricting what that delegate may act on. Delegation does not
//! nest: a delegate cannot re-delegate.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which hashing/prefixing scheme a [`Signature`] was produced under.
///
/// Recovery itself (digest construction, `ecrecover`) lives in
/// `bubble-crypto`; this crate only carries the tag and the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// The 32-byte digest is signed directly, with no prefix.
    Plain,
    /// `"\x19Ethereum Signed Message:\n" + len(digest) + digest` (EIP-191).
    Eip191,
    /// An EIP-712 typed-data signing hash.
    Eip712,
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignatureKind::Plain => "plain",
            SignatureKind::Eip191 => "eip191",
            SignatureKind::Eip712 => "eip712",
        };
        write!(f, "{s}")
    }
}

/// Errors parsing a [`Signature`] from its wire hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature must be exactly 65 bytes (r, s, v)")]
    WrongLength,
    #[error("signature is not valid hex")]
    InvalidHex,
}

/// A 65-byte `(r, s, v)` ECDSA signature tagged with the scheme it was
/// produced under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub kind: SignatureKind,
    pub bytes: [u8; 65],
}

impl Signature {
    pub fn new(kind: SignatureKind, bytes: [u8; 65]) -> Self {
        Signature { kind, bytes }
    }

    /// Parses a signature from a `0x`-prefixed (or bare) hex string, 130 hex
    /// digits long, tagged with `kind`.
    pub fn from_hex(kind: SignatureKind, input: &str) -> Result<Self, SignatureError> {
        let stripped = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")).unwrap_or(input);
        let decoded = hex::decode(stripped).map_err(|_| SignatureError::InvalidHex)?;
        let bytes: [u8; 65] = decoded.try_into().map_err(|_| SignatureError::WrongLength)?;
        Ok(Signature { kind, bytes })
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    pub fn r(&self) -> &[u8] {
        &self.bytes[0..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.bytes[32..64]
    }

    pub fn v(&self) -> u8 {
        self.bytes[64]
    }
}

/// The restriction a [`Delegation`] places on what the delegate may act on.
///
/// `Scope::Contract` restricts to a single Access Control Contract on a
/// single chain, across every provider hosting it. `Scope::Bubble` further
/// restricts to one provider. The `provider` string is matched by raw
/// equality against the `ContentId.provider` the request targets — no URL
/// normalization (trailing slash, scheme case, etc.) is performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Scope {
    ContractPermission { chain: u64, contract: Address },
    BubblePermission { chain: u64, contract: Address, provider: String },
}

impl Scope {
    pub fn chain(&self) -> u64 {
        match self {
            Scope::ContractPermission { chain, .. } => *chain,
            Scope::BubblePermission { chain, .. } => *chain,
        }
    }

    pub fn contract(&self) -> Address {
        match self {
            Scope::ContractPermission { contract, .. } => *contract,
            Scope::BubblePermission { contract, .. } => *contract,
        }
    }

    /// `true` if a request against `(chain, contract, provider)` falls
    /// within this scope.
    pub fn permits(&self, chain: u64, contract: Address, provider: &str) -> bool {
        match self {
            Scope::ContractPermission { chain: c, contract: addr } => *c == chain && *addr == contract,
            Scope::BubblePermission { chain: c, contract: addr, provider: p } => {
                *c == chain && *addr == contract && p == provider
            }
        }
    }
}

/// What a [`Delegation`] grants: either every permission the grantor holds,
/// or a restricted list of [`Scope`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelegatedPermissions {
    All(AllScopes),
    Restricted(Vec<Scope>),
}

/// Marker matching the wire value `"all"` for [`DelegatedPermissions::All`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllScopes;

impl Serialize for AllScopes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("all")
    }
}

impl<'de> Deserialize<'de> for AllScopes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "all" {
            Ok(AllScopes)
        } else {
            Err(serde::de::Error::custom("expected the literal string \"all\""))
        }
    }
}

/// A one-level signed grant: `delegate` may act on the grantor's behalf,
/// restricted to `permissions`, until `expires`. Delegations do not chain —
/// a delegate's own signature on a further delegation is not honored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub delegate: Address,
    pub expires: u64,
    pub permissions: DelegatedPermissions,
    pub signature: SignatureEnvelope,
}

/// The delegation's own signature, hex-encoded with an explicit scheme tag,
/// mirroring [`Signature`]'s wire shape without depending on its non-`Copy`
/// byte array inside a `serde`-derived struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    pub kind: SignatureKind,
    pub signature: String,
}

impl SignatureEnvelope {
    pub fn to_signature(&self) -> Result<Signature, SignatureError> {
        Signature::from_hex(self.kind, &self.signature)
    }
}

impl Delegation {
    /// `true` if `now` (unix seconds) is before this delegation's expiry.
    pub fn is_active(&self, now: u64) -> bool {
        now < self.expires
    }

    /// `true` if this delegation's grant covers a request against
    /// `(chain, contract, provider)`.
    pub fn permits(&self, chain: u64, contract: Address, provider: &str) -> bool {
        match &self.permissions {
            DelegatedPermissions::All(_) => true,
            DelegatedPermissions::Restricted(scopes) => {
                scopes.iter().any(|scope| scope.permits(chain, contract, provider))
            }
        }
    }
}
