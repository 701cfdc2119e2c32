//! Canonical request hashing, signature recovery, and delegation
//! verification for the Bubble Protocol Guardian.
//!
//! `bubble-types` defines the wire shapes; this crate turns them into an
//! `Address` the Guardian can look ACC permissions up under. Everything here
//! runs locally against `alloy-primitives`'s secp256k1 backend — no chain RPC
//! call is ever needed just to recover a signer.
//!
//! # Modules
//!
//! - [`canonical`] - the fixed-field-order byte serialization a signature
//!   actually covers, and the EIP-191 digest shared by requests and
//!   delegations.
//! - [`eip712`] - the `Eip712`-scheme typed-data domain and signing hashes.
//! - [`recover`] - request signature recovery across all three schemes, plus
//!   the `"public"` sentinel.
//! - [`delegation`] - delegation signature recovery, expiry, and scope
//!   checking.

pub mod canonical;
pub mod delegation;
pub mod eip712;
pub mod recover;
