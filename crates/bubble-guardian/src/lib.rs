//! The Bubble Protocol Guardian: request validation, signature recovery,
//! ACC-driven authorization, `DataServer` dispatch, and subscription fan-out.
//!
//! This crate has no opinion on how an Access Control Contract is reached or
//! how bytes are physically stored — it drives two narrow `async_trait`
//! interfaces, [`BlockchainProvider`] and [`DataServer`], that a deployment
//! supplies. The [`testing`] module supplies in-memory implementations of
//! both for exercising the Guardian without either collaborator.
//!
//! # Modules
//!
//! - [`blockchain_provider`] - the ACC query interface.
//! - [`data_server`] - the physical storage interface and its option types.
//! - [`replay`] - the `(signatory, nonce)` replay cache.
//! - [`subscription`] - the subscription registry and notification fan-out.
//! - [`guardian`] - the authorization-and-dispatch engine itself.
//! - [`testing`] - in-memory fixtures, built only under `#[cfg(test)]` and
//!   for downstream integration tests.

pub mod blockchain_provider;
pub mod data_server;
pub mod guardian;
pub mod replay;
pub mod subscription;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blockchain_provider::{BlockchainProvider, ChainError};
pub use data_server::{DataServer, DataServerError};
pub use guardian::{Guardian, GuardianError, GuardianOutcome};
pub use replay::ReplayCache;
pub use subscription::{Notification, NotificationEvent, Subscription, SubscriptionManager};
