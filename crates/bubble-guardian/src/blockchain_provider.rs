//! `BlockchainProvider` — the narrow interface the Guardian uses to query an
//! Access Control Contract. Everything about *how* a chain is
//! reached (RPC client, caching, retry) is the implementation's business; the
//! Guardian only ever calls the two methods below.

use alloy_primitives::Address;
use async_trait::async_trait;
use bubble_types::Permissions;

/// Errors a [`BlockchainProvider`] implementation may report.
///
/// [`ChainError::Transient`] is the only variant the Guardian inspects: it is
/// mapped to `INTERNAL_ERROR` with the message "Blockchain unavailable".
/// Anything else is still surfaced as `INTERNAL_ERROR` (the Guardian never
/// leaks chain-provider internals to a caller) but is logged with its own
/// detail.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("blockchain unavailable")]
    Transient,
    #[error("chain provider error: {0}")]
    Other(String),
}

/// The Guardian's only window onto an Access Control Contract.
///
/// Signatory recovery is deliberately not part of this trait: the Guardian
/// recovers signatures locally via `bubble-crypto`'s standard secp256k1 +
/// keccak256 primitives rather than asking the chain to do it. A
/// `BlockchainProvider` implementation only ever needs to answer "what chain
/// am I" and "what can this address do".
#[async_trait]
pub trait BlockchainProvider: Send + Sync {
    /// The chain id this provider is bound to, checked against every
    /// request's declared `chainId`.
    async fn chain_id(&self) -> u64;

    /// The ACC's permission word for `(contract, signatory, path_hash)`.
    async fn get_permissions(
        &self,
        contract: Address,
        signatory: Address,
        path_hash: &str,
    ) -> Result<Permissions, ChainError>;
}
