//! Core wire types for the Bubble Protocol Guardian.
//!
//! This crate is blockchain-agnostic: it defines the data model a Guardian
//! implementation needs regardless of which chain an Access Control Contract
//! lives on. Signature recovery and EIP-712 digest construction live in the
//! sibling `bubble-crypto` crate; chain RPC and byte-storage backends are
//! external collaborators (see `bubble-guardian`).
//!
//! # Modules
//!
//! - [`content_id`] - the globally-unique `ContentId` four-tuple and its three
//!   wire surface forms (object, base64url string, DID).
//! - [`path`] - the `<32-byte-hex>[/name]` `Path` grammar.
//! - [`permissions`] - the 256-bit ACC permissions-word decoder.
//! - [`signature`] - the three signature kinds and the one-level delegation
//!   grant.
//! - [`rpc`] - the JSON-RPC envelope, method enum, and numeric error taxonomy.

pub mod content_id;
pub mod path;
pub mod permissions;
pub mod rpc;
pub mod signature;

pub use content_id::ContentId;
pub use path::Path;
pub use permissions::Permissions;
pub use rpc::envelope::{RequestEnvelope, ResponseEnvelope};
pub use rpc::error::GuardianErrorCode;
pub use rpc::method::GuardianMethod;
pub use signature::{Delegation, Scope, Signature, SignatureKind};
