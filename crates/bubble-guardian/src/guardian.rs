//! The Guardian engine: the nine-step algorithm that turns a
//! signed [`RequestParams`] into either a dispatched [`DataServer`] call or a
//! [`GuardianError`].
//!
//! A thin generic struct holding its collaborators, with one public entry
//! point that routes by method and normalizes every collaborator's error
//! into a single wire-facing error type. A `Guardian` holds only
//! `Arc`-shared state internally, so a server wraps one instance in an `Arc`
//! and hands the same clone to every connection task.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use bubble_types::rpc::envelope::RequestParams;
use bubble_types::rpc::error::GuardianErrorCode;
use bubble_types::{GuardianMethod, Path};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::blockchain_provider::{BlockchainProvider, ChainError};
use crate::data_server::{
    parse_delete_options, parse_list_options, parse_silent_option, parse_subscribe_options, DataServer, DataServerError,
};
use crate::replay::{ReplayCache, ReplayError};
use crate::subscription::{Notification, SubscriptionManager};

/// An error the Guardian raises on the wire.
#[derive(Debug, Clone)]
pub struct GuardianError {
    pub code: GuardianErrorCode,
    pub message: String,
}

impl GuardianError {
    pub fn new(code: GuardianErrorCode, message: impl Into<String>) -> Self {
        GuardianError { code, message: message.into() }
    }

    pub fn from_code(code: GuardianErrorCode) -> Self {
        let message = code.to_string();
        GuardianError { code, message }
    }
}

impl std::fmt::Display for GuardianError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GuardianError {}

/// What handling a request produced. `subscribe` is the only method that
/// hands the caller a live receiver rather than a one-shot result, so it gets
/// its own variant instead of being squeezed into `Value`.
pub enum GuardianOutcome {
    Result(Value),
    Subscribed {
        subscription_id: Uuid,
        snapshot: Value,
        receiver: broadcast::Receiver<Notification>,
    },
}

fn ds_err(err: DataServerError) -> GuardianError {
    GuardianError::new(err.code(), err.to_string())
}

/// Joins signed RPC, recovered pubkey, ACC permission lookup, parsed path and
/// `DataServer` dispatch into one authorization decision per request.
pub struct Guardian<B, D> {
    blockchain: Arc<B>,
    data_server: Arc<D>,
    provider_url: String,
    replay: ReplayCache,
    subscriptions: SubscriptionManager,
}

impl<B: BlockchainProvider, D: DataServer> Guardian<B, D> {
    pub fn new(blockchain: Arc<B>, data_server: Arc<D>, provider_url: impl Into<String>, replay_skew: Duration) -> Self {
        Guardian {
            blockchain,
            data_server,
            provider_url: provider_url.into(),
            replay: ReplayCache::new(replay_skew),
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Runs the full authorization-then-dispatch algorithm for one request.
    #[tracing::instrument(skip(self, params), fields(method = %method))]
    pub async fn handle(
        &self,
        method: GuardianMethod,
        params: &RequestParams,
        now_ms: i64,
        connection_id: Uuid,
    ) -> Result<GuardianOutcome, GuardianError> {
        self.validate_envelope(method, params)?;

        let expected_chain = self.blockchain.chain_id().await;
        if params.chain_id != expected_chain {
            return Err(GuardianError::from_code(GuardianErrorCode::BlockchainNotSupported));
        }

        let path = match &params.file {
            Some(raw) => Path::parse(raw).map_err(|_| GuardianError::new(GuardianErrorCode::InvalidParams, "malformed file path"))?,
            None => Path::root(),
        };

        let signatory = self.resolve_signatory(method, params, now_ms).await?;

        self.replay
            .check_and_record(signatory, &params.nonce, params.timestamp as i64, now_ms)
            .map_err(|err| match err {
                ReplayError::OutsideWindow => {
                    GuardianError::new(GuardianErrorCode::AuthenticationFailure, "timestamp is outside the accepted window")
                }
                ReplayError::Replayed => GuardianError::new(GuardianErrorCode::AuthenticationFailure, "nonce has already been used"),
            })?;

        let permissions = self
            .blockchain
            .get_permissions(params.contract, signatory, path.permissioned_part())
            .await
            .map_err(|err| match err {
                ChainError::Transient => {
                    GuardianError::new(GuardianErrorCode::InternalError, "Blockchain unavailable — please try again later")
                }
                ChainError::Other(detail) => {
                    tracing::warn!(error = %detail, "blockchain provider error");
                    GuardianError::new(GuardianErrorCode::InternalError, "Blockchain unavailable — please try again later")
                }
            })?;

        if permissions.is_bubble_terminated() {
            return self.handle_terminated_bubble(method, params).await;
        }

        let terminated_overlay = false;
        let permissioned_path = path.apply_permissions(&permissions, terminated_overlay);
        self.check_method_permission(method, &permissioned_path)?;

        self.dispatch(method, params, &path, signatory, connection_id).await
    }

    /// Resolves the signature into an effective signatory, substituting the
    /// delegator's address when a [`Delegation`](bubble_types::Delegation) is
    /// present and valid. Any delegation failure — scope
    /// mismatch, expiry, signature mismatch — collapses to `PERMISSION_DENIED`
    /// not a distinct code.
    async fn resolve_signatory(&self, method: GuardianMethod, params: &RequestParams, now_ms: i64) -> Result<Address, GuardianError> {
        let signature = params
            .signature
            .to_signature()
            .map_err(|_| GuardianError::from_code(GuardianErrorCode::AuthenticationFailure))?;
        let canonical = params.canonical_payload(method);
        let recovered = bubble_crypto::recover::recover_signatory_or_public(&params.signatory, &canonical, &signature)
            .map_err(|_| GuardianError::from_code(GuardianErrorCode::AuthenticationFailure))?;

        match &params.delegate {
            None => Ok(recovered),
            Some(delegation) => {
                if delegation.delegate != recovered {
                    return Err(GuardianError::from_code(GuardianErrorCode::PermissionDenied));
                }
                let now_seconds = (now_ms.max(0) / 1000) as u64;
                bubble_crypto::delegation::verify_delegation(delegation, now_seconds, params.chain_id, params.contract, &self.provider_url)
                    .map_err(|_| GuardianError::from_code(GuardianErrorCode::PermissionDenied))
            }
        }
    }

    /// A terminated bubble only accepts one more `terminate` call (to let the
    /// `DataServer` finish reclaiming it); every other method drains a
    /// best-effort reclaim first ("observable race on
    /// terminate") and is then rejected with `BUBBLE_TERMINATED` regardless
    /// of whether that reclaim succeeded.
    async fn handle_terminated_bubble(&self, method: GuardianMethod, params: &RequestParams) -> Result<GuardianOutcome, GuardianError> {
        if method == GuardianMethod::Terminate {
            let options = parse_silent_option(params.options.as_ref()).map_err(ds_err)?;
            self.data_server.terminate(params.contract, options).await.map_err(ds_err)?;
            return Ok(GuardianOutcome::Result(Value::Null));
        }
        let _ = self.data_server.terminate(params.contract, crate::data_server::SilentOption { silent: true }).await;
        Err(GuardianError::new(
            GuardianErrorCode::BubbleTerminated,
            "bubble has been terminated; call 'terminate' to finish reclaiming it",
        ))
    }

    /// The per-method permission gate. `Terminate` shares `Create`'s
    /// root/write gate — the ACC has no separate terminate bit, only the
    /// root's write bit. `Unsubscribe` names a subscription id the caller
    /// already holds, not a bubble path, so there is nothing here to gate.
    fn check_method_permission(&self, method: GuardianMethod, path: &bubble_types::path::PermissionedPath) -> Result<(), GuardianError> {
        let granted = match method {
            GuardianMethod::Create => path.is_root() && path.permissions().can_write(),
            GuardianMethod::Write => path.is_valid() && path.is_file() && path.permissions().can_write(),
            GuardianMethod::Append => path.is_valid() && path.is_file() && (path.permissions().can_write() || path.permissions().can_append()),
            GuardianMethod::Read | GuardianMethod::List | GuardianMethod::Subscribe => path.is_valid() && path.permissions().can_read(),
            GuardianMethod::Delete => path.is_valid() && !path.is_root() && path.permissions().can_write(),
            GuardianMethod::Mkdir => path.is_valid() && !path.is_root() && path.is_directory() && path.permissions().can_write(),
            GuardianMethod::Terminate => path.is_root() && path.permissions().can_write(),
            GuardianMethod::Unsubscribe => true,
        };
        if granted {
            Ok(())
        } else {
            Err(GuardianError::from_code(GuardianErrorCode::PermissionDenied))
        }
    }

    async fn dispatch(
        &self,
        method: GuardianMethod,
        params: &RequestParams,
        path: &Path,
        signatory: Address,
        connection_id: Uuid,
    ) -> Result<GuardianOutcome, GuardianError> {
        let contract = params.contract;
        match method {
            GuardianMethod::Create => {
                let options = parse_silent_option(params.options.as_ref()).map_err(ds_err)?;
                self.data_server.create(contract, options).await.map_err(ds_err)?;
                Ok(GuardianOutcome::Result(self.content_id_value(contract, params, None)))
            }
            GuardianMethod::Write => {
                let data = self.require_data(params)?;
                self.data_server.write(contract, &path.as_str(), data).await.map_err(ds_err)?;
                self.notify_mutation(contract, path, crate::subscription::NotificationEvent::Write, data);
                Ok(GuardianOutcome::Result(self.content_id_value(contract, params, Some(path))))
            }
            GuardianMethod::Append => {
                let data = self.require_data(params)?;
                self.data_server.append(contract, &path.as_str(), data).await.map_err(ds_err)?;
                self.notify_mutation(contract, path, crate::subscription::NotificationEvent::Append, data);
                Ok(GuardianOutcome::Result(self.content_id_value(contract, params, Some(path))))
            }
            GuardianMethod::Read => {
                let options = parse_silent_option(params.options.as_ref()).map_err(ds_err)?;
                let content = self.data_server.read(contract, &path.as_str(), options).await.map_err(ds_err)?;
                Ok(GuardianOutcome::Result(Value::String(content)))
            }
            GuardianMethod::Delete => {
                let options = parse_delete_options(params.options.as_ref()).map_err(ds_err)?;
                self.data_server.delete(contract, &path.as_str(), options).await.map_err(ds_err)?;
                self.notify_mutation(contract, path, crate::subscription::NotificationEvent::Delete, "");
                Ok(GuardianOutcome::Result(Value::Null))
            }
            GuardianMethod::Mkdir => {
                let options = parse_silent_option(params.options.as_ref()).map_err(ds_err)?;
                self.data_server.mkdir(contract, &path.as_str(), options).await.map_err(ds_err)?;
                self.notify_mutation(contract, path, crate::subscription::NotificationEvent::Mkdir, "");
                Ok(GuardianOutcome::Result(self.content_id_value(contract, params, Some(path))))
            }
            GuardianMethod::List => {
                let options = parse_list_options(params.options.as_ref()).map_err(ds_err)?;
                let entries = self.data_server.list(contract, &path.as_str(), options).await.map_err(ds_err)?;
                Ok(GuardianOutcome::Result(serde_json::to_value(entries).expect("ListEntry always serializes")))
            }
            GuardianMethod::Subscribe => {
                let options = parse_subscribe_options(params.options.as_ref()).map_err(ds_err)?;
                let subscription_id = Uuid::new_v4();
                let result = self
                    .data_server
                    .subscribe(contract, &path.as_str(), &subscription_id.to_string(), options)
                    .await
                    .map_err(ds_err)?;
                let receiver = self.subscriptions.subscribe(
                    subscription_id,
                    contract,
                    path.permissioned_part().to_string(),
                    path.name().map(str::to_string),
                    signatory,
                    connection_id,
                );
                Ok(GuardianOutcome::Subscribed {
                    subscription_id,
                    snapshot: serde_json::to_value(result).expect("SubscribeResult always serializes"),
                    receiver,
                })
            }
            GuardianMethod::Unsubscribe => {
                let subscription_id = self.require_subscription_id(params)?;
                let _ = self.data_server.unsubscribe(&subscription_id.to_string()).await;
                self.subscriptions.unsubscribe(subscription_id);
                Ok(GuardianOutcome::Result(Value::Null))
            }
            GuardianMethod::Terminate => {
                let options = parse_silent_option(params.options.as_ref()).map_err(ds_err)?;
                self.data_server.terminate(contract, options).await.map_err(ds_err)?;
                Ok(GuardianOutcome::Result(Value::Null))
            }
        }
    }

    fn require_data<'a>(&self, params: &'a RequestParams) -> Result<&'a str, GuardianError> {
        params
            .data
            .as_deref()
            .ok_or_else(|| GuardianError::new(GuardianErrorCode::InvalidParams, "this method requires 'data'"))
    }

    fn require_subscription_id(&self, params: &RequestParams) -> Result<Uuid, GuardianError> {
        let raw = params
            .options
            .as_ref()
            .and_then(|v| v.get("subscriptionId"))
            .and_then(Value::as_str)
            .ok_or_else(|| GuardianError::new(GuardianErrorCode::InvalidParams, "unsubscribe requires options.subscriptionId"))?;
        Uuid::parse_str(raw).map_err(|_| GuardianError::new(GuardianErrorCode::InvalidParams, "subscriptionId is not a valid uuid"))
    }

    fn content_id_value(&self, contract: Address, params: &RequestParams, path: Option<&Path>) -> Value {
        let mut content_id = bubble_types::ContentId::new(params.chain_id, contract, self.provider_url.clone());
        if let Some(p) = path {
            content_id = content_id.set_file(p.clone());
        }
        Value::String(content_id.to_string())
    }

    /// Publishes a best-effort fan-out notification for a mutation. A
    /// `DataServer` implementation is free to call
    /// `self.subscriptions().publish(...)` itself instead (e.g. when it
    /// batches writes); this helper covers the common case where the
    /// Guardian's own dispatch is the only mutation path.
    fn notify_mutation(&self, contract: Address, path: &Path, event: crate::subscription::NotificationEvent, data: &str) {
        let file = serde_json::json!({
            "name": path.as_str(),
            "type": if path.is_file() { "file" } else { "directory" },
        });
        let notification = Notification {
            subscription_id: Uuid::nil(),
            event,
            file,
            data: if data.is_empty() { None } else { Some(Value::String(data.to_string())) },
        };
        self.subscriptions.publish(contract, path.permissioned_part(), path.name(), notification);
    }

    /// Envelope-level completeness checks that don't need the chain or a
    /// signature: every method that names a file needs one, and the two
    /// content-bearing methods need `data`.
    fn validate_envelope(&self, method: GuardianMethod, params: &RequestParams) -> Result<(), GuardianError> {
        let needs_file = matches!(
            method,
            GuardianMethod::Write
                | GuardianMethod::Append
                | GuardianMethod::Read
                | GuardianMethod::Delete
                | GuardianMethod::Mkdir
                | GuardianMethod::List
                | GuardianMethod::Subscribe
        );
        if needs_file && params.file.is_none() {
            return Err(GuardianError::new(GuardianErrorCode::InvalidParams, "'file' is required for this method"));
        }
        let needs_data = matches!(method, GuardianMethod::Write | GuardianMethod::Append);
        if needs_data && params.data.is_none() {
            return Err(GuardianError::new(GuardianErrorCode::InvalidParams, "'data' is required for this method"));
        }
        Ok(())
    }
}
